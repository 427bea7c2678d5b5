//! Collective writes of rank-partitioned arrays.
//!
//! Each worker resolves its [`Layout`], then the whole group creates the store file and the
//! dataset, selects each worker's rows and writes every contribution in one collective call.
//!
//! ```rust
//! use simple_pario::group::{Communicator, LocalGroup};
//! use simple_pario::writer::CollectiveWriter;
//!
//! # let dir = tempfile::tempdir().unwrap();
//! # let path = dir.path().join("ranks.pario");
//! let writer = CollectiveWriter::new(&path, "ranks");
//! LocalGroup::run(4, |comm| {
//!     let local = vec![comm.rank() as i32; comm.rank() + 1];
//!     writer.write(&comm, &local, |rank| rank as i64 + 1).unwrap();
//! });
//! assert_eq!(
//!     writer.read::<i32>().unwrap(),
//!     vec![0, 1, 1, 2, 2, 2, 3, 3, 3, 3]
//! );
//! ```

use crate::attribute;
use crate::datatype::Element;
use crate::error::{Error, Result};
use crate::group::{Communicator, Solo};
use crate::layout::Layout;
use crate::selection::Dataspace;
use crate::store::{ArrayFile, Dataset, FileAccess};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Writes one dataset, assembled from every worker's contribution, into a new store file.
#[derive(Debug, Clone)]
pub struct CollectiveWriter {
    path: PathBuf,
    dataset: String,
    row_shape: Vec<u64>,
}

impl CollectiveWriter {
    /// A writer of a 1-D dataset called `dataset` in a new store file at `path`.
    pub fn new(path: impl Into<PathBuf>, dataset: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            dataset: dataset.into(),
            row_shape: Vec::new(),
        }
    }

    /// Give every row the shape `row_shape`, making the dataset `1 + row_shape.len()` dimensional.
    ///
    /// Workers then contribute whole rows: a contribution of `n` rows holds
    /// `n * row_shape.iter().product()` elements.
    pub fn with_row_shape(mut self, row_shape: &[u64]) -> Self {
        self.row_shape = row_shape.to_vec();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    fn row_len(&self) -> Result<u64> {
        self.row_shape
            .iter()
            .try_fold(1u64, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "row shape {:?} holds more than {} elements",
                    self.row_shape,
                    u64::MAX
                ))
            })
    }

    fn shape(&self, rows: u64) -> Vec<u64> {
        std::iter::once(rows).chain(self.row_shape.iter().copied()).collect()
    }

    /// Write `local` as this worker's rows, with every worker's row count given by `contribution`.
    ///
    /// This is a collective operation. `contribution` must be the same function on every worker
    /// and `local` must hold exactly `contribution(rank)` rows.
    pub fn write<T, C, F>(&self, comm: &C, local: &[T], contribution: F) -> Result<Layout>
    where
        T: Element,
        C: Communicator,
        F: Fn(usize) -> i64,
    {
        let layout = Layout::resolve(comm.rank(), comm.size(), contribution)?;
        self.write_layout(comm, &layout, local, |_| Ok(()))?;
        Ok(layout)
    }

    /// Write `local` as this worker's rows, learning every other worker's row count by exchange.
    ///
    /// This is a collective operation.
    pub fn write_exchanged<T, C>(&self, comm: &C, local: &[T]) -> Result<Layout>
    where
        T: Element,
        C: Communicator,
    {
        let rows = self.rows_of(local)?;
        let layout = Layout::exchange(comm, rows)?;
        self.write_layout(comm, &layout, local, |_| Ok(()))?;
        Ok(layout)
    }

    /// Write `data` from a single worker, the degenerate one-worker group.
    pub fn write_single<T: Element>(&self, data: &[T]) -> Result<Layout> {
        self.write_single_with(data, |_| Ok(()))
    }

    /// Write `data` from a single worker and attach a scalar attribute before closing the dataset.
    pub fn write_single_with_attribute<T: Element, A: Element>(
        &self,
        data: &[T],
        name: &str,
        value: A,
    ) -> Result<Layout> {
        self.write_single_with(data, |dataset| attribute::attach_scalar(dataset, name, value))
    }

    fn write_single_with<T, H>(&self, data: &[T], finish: H) -> Result<Layout>
    where
        T: Element,
        H: FnOnce(&Dataset<'_>) -> Result<()>,
    {
        let rows = self.rows_of(data)?;
        let layout = Layout::from_sizes(0, &[rows])?;
        self.write_layout(&Solo, &layout, data, finish)?;
        Ok(layout)
    }

    fn rows_of<T>(&self, local: &[T]) -> Result<u64> {
        let row_len = self.row_len()?;
        let len = local.len() as u64;
        match row_len {
            0 if len == 0 => Ok(0),
            0 => Err(Error::InvalidConfig(format!(
                "{len} elements cannot fill rows of shape {:?}",
                self.row_shape
            ))),
            _ if len % row_len != 0 => Err(Error::InvalidConfig(format!(
                "{len} elements do not make whole rows of shape {:?}",
                self.row_shape
            ))),
            _ => Ok(len / row_len),
        }
    }

    fn write_layout<T, C, H>(&self, comm: &C, layout: &Layout, local: &[T], finish: H) -> Result<()>
    where
        T: Element,
        C: Communicator,
        H: FnOnce(&Dataset<'_>) -> Result<()>,
    {
        let expected = layout.extent.checked_mul(self.row_len()?);
        if expected != Some(local.len() as u64) {
            return Err(Error::InvalidConfig(format!(
                "rank {} holds {} elements but its contribution is {} rows of shape {:?}",
                comm.rank(),
                local.len(),
                layout.extent,
                self.row_shape
            )));
        }

        let access = FileAccess::parallel(comm);
        let file = ArrayFile::create(&self.path, &access)?;

        let global_space = Dataspace::simple(&self.shape(layout.global_extent))?;
        let dataset = file.create_dataset::<T>(&self.dataset, &global_space)?;
        let local_space = Dataspace::simple(&self.shape(layout.extent))?;

        let file_selection = global_space.select(layout.offset, layout.extent)?;
        let memory_selection = local_space.select_all();

        dataset.write(&memory_selection, &file_selection, local)?;
        finish(&dataset)?;

        debug!("Rank {} wrote {}", comm.rank(), file_selection);
        if comm.rank() == 0 {
            info!(
                "Wrote {} rows from {} workers to {}:{}",
                layout.global_extent,
                comm.size(),
                self.path.display(),
                self.dataset
            );
        }
        Ok(())
    }

    /// Read the whole dataset back.
    pub fn read<T: Element>(&self) -> Result<Vec<T>> {
        let access = FileAccess::independent();
        let file = ArrayFile::open(&self.path, &access)?;
        let dataset = file.dataset(&self.dataset)?;
        dataset.read()
    }
}
