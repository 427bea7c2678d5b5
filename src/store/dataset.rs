use super::{read_exact_at, write_all_at, ArrayFile, DatasetRecord};
use crate::datatype::{DataType, Element};
use crate::error::{Error, Result};
use crate::selection::{Dataspace, Hyperslab};
use log::debug;

/// An open dataset in a store file.
pub struct Dataset<'f> {
    file: &'f ArrayFile<'f>,
    record: DatasetRecord,
}

impl std::fmt::Debug for Dataset<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("file", self.file)
            .field("record", &self.record)
            .finish()
    }
}

impl<'f> Dataset<'f> {
    pub(crate) fn new(file: &'f ArrayFile<'f>, record: DatasetRecord) -> Self {
        Self { file, record }
    }

    pub(crate) fn file(&self) -> &'f ArrayFile<'f> {
        self.file
    }

    pub(crate) fn record(&self) -> &DatasetRecord {
        &self.record
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn data_type(&self) -> DataType {
        self.record.data_type
    }

    pub fn shape(&self) -> &[u64] {
        &self.record.shape
    }

    /// The dataspace this dataset was created with.
    pub fn dataspace(&self) -> Result<Dataspace> {
        Dataspace::simple(&self.record.shape)
    }

    fn check_type<T: Element>(&self) -> Result<()> {
        if T::DATA_TYPE != self.record.data_type {
            return Err(Error::TypeMismatch {
                expected: self.record.data_type,
                found: T::DATA_TYPE,
            });
        }
        Ok(())
    }

    fn check_file_selection(&self, selection: &Hyperslab<'_>) -> Result<()> {
        if selection.space().shape() != self.record.shape.as_slice() {
            return Err(Error::SelectionMismatch(format!(
                "{} was not made from the shape {:?} of dataset {}",
                selection, self.record.shape, self.record.name
            )));
        }
        Ok(())
    }

    fn byte_offset(&self, selection: &Hyperslab<'_>) -> u64 {
        self.record.data_offset + selection.linear_range().start * self.record.data_type.size() as u64
    }

    /// Write the `memory` selection of `buffer` into the `file` selection of this dataset.
    ///
    /// This is a collective operation. Every worker must call it, including workers whose
    /// selections are empty, and it returns on no worker until all of them have written.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeMismatch`] if `T` is not the dataset's element type,
    /// - [`Error::SelectionMismatch`] if `buffer` does not fill the memory dataspace, the two
    ///   selections differ in size, or `file` was not made from the dataset's shape,
    /// - [`Error::Io`] if the write fails.
    pub fn write<T: Element>(
        &self,
        memory: &Hyperslab<'_>,
        file: &Hyperslab<'_>,
        buffer: &[T],
    ) -> Result<()> {
        self.check_type::<T>()?;
        self.check_file_selection(file)?;
        if buffer.len() as u64 != memory.space().element_count() {
            return Err(Error::SelectionMismatch(format!(
                "buffer holds {} elements but its dataspace {:?} declares {}",
                buffer.len(),
                memory.space().shape(),
                memory.space().element_count()
            )));
        }
        if memory.element_count() != file.element_count() {
            return Err(Error::SelectionMismatch(format!(
                "memory selection {} and file selection {} differ in size",
                memory, file
            )));
        }

        let comm = self.file.comm();
        let range = memory.linear_range();
        let elements = &buffer[range.start as usize..range.end as usize];
        if !elements.is_empty() {
            let offset = self.byte_offset(file);
            debug!(
                "Rank {} writing {} elements to {} of {} at byte {}",
                comm.rank(),
                elements.len(),
                file,
                self.record.name,
                offset
            );
            let handle = self.file.file();
            write_all_at(handle, bytemuck::cast_slice(elements), offset)?;
            handle.sync_data()?;
        } else {
            debug!(
                "Rank {} joining write of {} with an empty selection",
                comm.rank(),
                self.record.name
            );
        }

        comm.barrier()?;
        Ok(())
    }

    /// Read the `file` selection of this dataset.
    pub fn read_selection<T: Element>(&self, file: &Hyperslab<'_>) -> Result<Vec<T>> {
        self.check_type::<T>()?;
        self.check_file_selection(file)?;
        let mut out = vec![<T as bytemuck::Zeroable>::zeroed(); file.element_count() as usize];
        read_exact_at(
            self.file.file(),
            bytemuck::cast_slice_mut(&mut out),
            self.byte_offset(file),
        )?;
        Ok(out)
    }

    /// Read every element of the dataset in row-major order.
    pub fn read<T: Element>(&self) -> Result<Vec<T>> {
        let space = self.dataspace()?;
        self.read_selection(&space.select_all())
    }

    /// Read the element at `index`, one coordinate per dimension.
    pub fn read_element<T: Element>(&self, index: &[u64]) -> Result<T> {
        self.check_type::<T>()?;
        let linear = self
            .dataspace()?
            .linear_index(index)
            .ok_or_else(|| Error::SelectionMismatch(format!(
                "index {:?} lies outside shape {:?}",
                index, self.record.shape
            )))?;
        let mut out = [<T as bytemuck::Zeroable>::zeroed()];
        read_exact_at(
            self.file.file(),
            bytemuck::cast_slice_mut(&mut out),
            self.record.data_offset + linear * self.record.data_type.size() as u64,
        )?;
        Ok(out[0])
    }
}

impl Drop for Dataset<'_> {
    fn drop(&mut self) {
        debug!("Rank {} closing dataset {}", self.file.comm().rank(), self.record.name);
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::group::{Communicator, LocalGroup};
    use crate::selection::Dataspace;
    use crate::store::{ArrayFile, FileAccess};

    #[test]
    fn matrix_elements_read_back_row_major() {
        let dir = tempfile::tempdir().unwrap();
        let access = FileAccess::independent();
        let file = ArrayFile::create(dir.path().join("matrix.pario"), &access).unwrap();
        let space = Dataspace::simple(&[4, 5]).unwrap();
        let dataset = file.create_dataset::<i32>("IntegerMatrix", &space).unwrap();
        let matrix: Vec<i32> = (0..20).collect();
        let memory = Dataspace::simple(&[20]).unwrap();
        dataset
            .write(&memory.select_all(), &space.select_all(), &matrix)
            .unwrap();

        for r in 0..4u64 {
            for c in 0..5u64 {
                assert_eq!(dataset.read_element::<i32>(&[r, c]).unwrap(), (5 * r + c) as i32);
            }
        }
        assert!(matches!(
            dataset.read_element::<i32>(&[4, 0]),
            Err(Error::SelectionMismatch(_))
        ));
    }

    #[test]
    fn wrong_element_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let access = FileAccess::independent();
        let file = ArrayFile::create(dir.path().join("typed.pario"), &access).unwrap();
        let space = Dataspace::simple(&[2]).unwrap();
        let dataset = file.create_dataset::<f64>("d", &space).unwrap();
        let err = dataset
            .write(&space.select_all(), &space.select_all(), &[1i32, 2])
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert!(dataset.read::<f32>().is_err());
    }

    #[test]
    fn selections_of_different_size_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let access = FileAccess::independent();
        let file = ArrayFile::create(dir.path().join("sizes.pario"), &access).unwrap();
        let space = Dataspace::simple(&[6]).unwrap();
        let dataset = file.create_dataset::<u16>("d", &space).unwrap();
        let memory = Dataspace::simple(&[3]).unwrap();
        let err = dataset
            .write(&memory.select_all(), &space.select(0, 2).unwrap(), &[1u16, 2, 3])
            .unwrap_err();
        assert!(matches!(err, Error::SelectionMismatch(_)));
        let err = dataset
            .write(&memory.select_all(), &memory.select_all(), &[1u16, 2, 3])
            .unwrap_err();
        assert!(matches!(err, Error::SelectionMismatch(_)));
    }

    #[test]
    fn empty_selection_still_joins_the_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pario");
        let results = LocalGroup::run(3, |comm| {
            let access = FileAccess::parallel(&comm);
            let file = ArrayFile::create(&path, &access)?;
            let global = Dataspace::simple(&[4]).unwrap();
            let dataset = file.create_dataset::<i32>("d", &global)?;
            // Rank 1 contributes nothing.
            let (offset, local): (u64, Vec<i32>) = match comm.rank() {
                0 => (0, vec![10, 11]),
                1 => (2, vec![]),
                _ => (2, vec![12, 13]),
            };
            let memory = Dataspace::simple(&[local.len() as u64]).unwrap();
            let selection = global.select(offset, local.len() as u64)?;
            dataset.write(&memory.select_all(), &selection, &local)?;
            dataset.read::<i32>()
        });
        for result in results {
            assert_eq!(result.unwrap(), vec![10, 11, 12, 13]);
        }
    }
}
