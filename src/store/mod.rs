//! The shared array store.
//!
//! A store is one file holding named, typed, shaped datasets, each optionally carrying named
//! attributes. The file is opened through a [`FileAccess`] configuration that names the group
//! of workers sharing it. Operations that change the store's catalog (creating the file, a
//! dataset or an attribute) are collective: every worker of the group calls them with the same
//! arguments, rank 0 performs the change and every worker checks that the result matches its
//! own arguments.
//!
//! Handles borrow the handle they were created from, so they are released in reverse order of
//! creation:
//!
//! ```rust
//! use simple_pario::group::Solo;
//! use simple_pario::selection::Dataspace;
//! use simple_pario::store::{ArrayFile, FileAccess};
//!
//! # let dir = tempfile::tempdir().unwrap();
//! # let path = dir.path().join("doc.pario");
//! let access = FileAccess::parallel(&Solo);
//! let file = ArrayFile::create(&path, &access).unwrap();
//! let space = Dataspace::simple(&[3]).unwrap();
//! let dataset = file.create_dataset::<i32>("values", &space).unwrap();
//! let memory = Dataspace::simple(&[3]).unwrap();
//! dataset
//!     .write(&memory.select_all(), &space.select_all(), &[7, 8, 9])
//!     .unwrap();
//! assert_eq!(dataset.read::<i32>().unwrap(), vec![7, 8, 9]);
//! ```

mod catalog;
mod dataset;

pub use dataset::Dataset;

pub(crate) use catalog::{read_exact_at, write_all_at, AttributeRecord, Catalog, DatasetRecord};

use crate::datatype::Element;
use crate::error::{Error, Result};
use crate::group::{Communicator, Solo};
use crate::selection::Dataspace;
use log::debug;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// How a store file is accessed: which group of workers shares it.
pub struct FileAccess<'c> {
    comm: &'c dyn Communicator,
}

impl<'c> FileAccess<'c> {
    /// Every worker of `comm` performs I/O against the same file.
    pub fn parallel<C: Communicator>(comm: &'c C) -> Self {
        debug!(
            "Rank {} configuring parallel access for {} workers",
            comm.rank(),
            comm.size()
        );
        Self { comm }
    }

    pub fn comm(&self) -> &'c dyn Communicator {
        self.comm
    }
}

impl FileAccess<'static> {
    /// A single worker owns the file.
    pub fn independent() -> Self {
        Self { comm: &Solo }
    }
}

impl Drop for FileAccess<'_> {
    fn drop(&mut self) {
        debug!("Rank {} releasing file access configuration", self.comm.rank());
    }
}

/// An open store file.
pub struct ArrayFile<'a> {
    file: File,
    path: PathBuf,
    access: &'a FileAccess<'a>,
}

impl std::fmt::Debug for ArrayFile<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayFile")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<'a> ArrayFile<'a> {
    /// Create a store file, truncating any existing file at `path`.
    ///
    /// This is a collective operation: rank 0 creates the file, then every other worker opens it.
    pub fn create(path: impl AsRef<Path>, access: &'a FileAccess<'a>) -> Result<Self> {
        let path = path.as_ref();
        let comm = access.comm();

        let file = if comm.rank() == 0 {
            debug!("Rank 0 creating {:?}", path);
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            Catalog::default().write_to(&file)?;
            file.set_len(catalog::HEADER_CAPACITY)?;
            comm.barrier()?;
            file
        } else {
            comm.barrier()?;
            debug!("Rank {} opening {:?}", comm.rank(), path);
            OpenOptions::new().read(true).write(true).open(path)?
        };

        Ok(Self {
            file,
            path: path.to_path_buf(),
            access,
        })
    }

    /// Open an existing store file for reading and writing.
    pub fn open(path: impl AsRef<Path>, access: &'a FileAccess<'a>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Rank {} opening {:?}", access.comm().rank(), path);
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Catalog::read_from(&file)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            access,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn comm(&self) -> &'a dyn Communicator {
        self.access.comm()
    }

    /// Names of the datasets in the store, in creation order.
    pub fn dataset_names(&self) -> Result<Vec<String>> {
        Ok(self
            .catalog()?
            .datasets
            .into_iter()
            .map(|d| d.name)
            .collect())
    }

    /// Create a dataset of element type `T` and shape `space`.
    ///
    /// This is a collective operation. Every worker must pass the same name, type and shape.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateName`] if the store already holds a dataset called `name`,
    /// - [`Error::InvalidConfig`] if the dataset's bytes would end past the largest file offset,
    /// - [`Error::InconsistentLayout`] if another worker created it with a different type or shape.
    pub fn create_dataset<T: Element>(&self, name: &str, space: &Dataspace) -> Result<Dataset<'_>> {
        let mut requested = None;
        let catalog = self.update_catalog(|catalog| {
            if catalog.dataset(name).is_some() {
                return Err(Error::DuplicateName(name.to_string()));
            }
            let record = DatasetRecord {
                name: name.to_string(),
                data_type: T::DATA_TYPE,
                shape: space.shape().to_vec(),
                data_offset: catalog.end_of_data()?,
                attributes: Vec::new(),
            };
            if record.data_end().is_none() {
                return Err(Error::InvalidConfig(format!(
                    "dataset {name} of {} {:?} does not fit in a store file",
                    T::DATA_TYPE,
                    space.shape()
                )));
            }
            catalog.datasets.push(record.clone());
            requested = Some(record);
            Ok(())
        })?;

        let stored = catalog
            .dataset(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        if Some(&stored) != requested.as_ref() {
            return Err(Error::InconsistentLayout(name.to_string()));
        }

        debug!(
            "Rank {} created dataset {} {:?} of {}",
            self.comm().rank(),
            name,
            stored.shape,
            stored.data_type
        );
        Ok(Dataset::new(self, stored))
    }

    /// Open an existing dataset.
    pub fn dataset(&self, name: &str) -> Result<Dataset<'_>> {
        let record = self
            .catalog()?
            .dataset(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        Ok(Dataset::new(self, record))
    }

    pub(crate) fn file(&self) -> &File {
        &self.file
    }

    pub(crate) fn catalog(&self) -> Result<Catalog> {
        Catalog::read_from(&self.file)
    }

    /// Apply `change` to the catalog as a collective operation and return the stored result.
    ///
    /// Every worker applies `change` to the same snapshot, so a change rejected on one worker is
    /// rejected on all of them. Rank 0 alone writes the result back.
    pub(crate) fn update_catalog<F>(&self, change: F) -> Result<Catalog>
    where
        F: FnOnce(&mut Catalog) -> Result<()>,
    {
        let comm = self.comm();

        comm.barrier()?;
        let mut catalog = self.catalog()?;
        change(&mut catalog)?;
        comm.barrier()?;

        if comm.rank() == 0 {
            catalog.write_to(&self.file)?;
            let end = catalog.end_of_data()?;
            if self.file.metadata()?.len() < end {
                self.file.set_len(end)?;
            }
        }
        comm.barrier()?;

        self.catalog()
    }
}

impl Drop for ArrayFile<'_> {
    fn drop(&mut self) {
        debug!("Rank {} closing {:?}", self.comm().rank(), self.path);
    }
}
