//! Headerless binary files written by a whole group.
//!
//! Two strategies produce the same file, the rank-ordered concatenation of every worker's
//! elements:
//!
//! - [`write_flat_collective`]: every worker writes its own byte range of the shared file,
//! - [`write_flat_single`]: every worker sends its elements to rank 0, which writes the file alone.

use crate::datatype::Element;
use crate::error::{Error, Result};
use crate::group::Communicator;
use crate::layout::Layout;
use crate::store::{read_exact_at, write_all_at};
use log::debug;
use std::fs::OpenOptions;
use std::path::Path;

/// Write `local` at element offset `layout.offset` of the file at `path`.
///
/// This is a collective operation. Rank 0 creates the file with its final length; it returns on
/// no worker until every worker has written.
pub fn write_flat_collective<T, C>(
    comm: &C,
    path: impl AsRef<Path>,
    layout: &Layout,
    local: &[T],
) -> Result<()>
where
    T: Element,
    C: Communicator + ?Sized,
{
    let path = path.as_ref();
    if local.len() as u64 != layout.extent {
        return Err(Error::InvalidConfig(format!(
            "rank {} holds {} elements but its layout extent is {}",
            comm.rank(),
            local.len(),
            layout.extent
        )));
    }
    let element_size = std::mem::size_of::<T>() as u64;

    let file = if comm.rank() == 0 {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(layout.global_extent * element_size)?;
        comm.barrier()?;
        file
    } else {
        comm.barrier()?;
        OpenOptions::new().write(true).open(path)?
    };

    if !local.is_empty() {
        let offset = layout.offset * element_size;
        debug!(
            "Rank {} writing {} bytes at byte {}",
            comm.rank(),
            local.len() as u64 * element_size,
            offset
        );
        write_all_at(&file, bytemuck::cast_slice(local), offset)?;
        file.sync_data()?;
    }

    comm.barrier()?;
    Ok(())
}

/// Gather every worker's `local` elements to rank 0 and write them from there.
///
/// This is a collective operation.
pub fn write_flat_single<T, C>(comm: &C, path: impl AsRef<Path>, local: &[T]) -> Result<()>
where
    T: Element,
    C: Communicator + ?Sized,
{
    let gathered = comm.gather_bytes(bytemuck::cast_slice(local), 0)?;
    if let Some(parts) = gathered {
        let bytes = parts.concat();
        debug!("Rank 0 writing {} gathered bytes", bytes.len());
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        write_all_at(&file, &bytes, 0)?;
        file.sync_data()?;
    }
    comm.barrier()?;
    Ok(())
}

/// Read a headerless file of `T` elements.
pub fn read_flat<T: Element>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let file = OpenOptions::new().read(true).open(path.as_ref())?;
    let len = file.metadata()?.len();
    let element_size = std::mem::size_of::<T>() as u64;
    if len % element_size != 0 {
        return Err(Error::SelectionMismatch(format!(
            "file of {len} bytes does not hold whole {} elements",
            T::DATA_TYPE
        )));
    }
    let mut out = vec![<T as bytemuck::Zeroable>::zeroed(); (len / element_size) as usize];
    read_exact_at(&file, bytemuck::cast_slice_mut(&mut out), 0)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::LocalGroup;

    #[test]
    fn both_strategies_produce_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let collective = dir.path().join("collective_write.dat");
        let single = dir.path().join("single_writer.dat");

        LocalGroup::run(4, |comm| {
            let local = vec![comm.rank() as i32; 3];
            let layout = Layout::resolve(comm.rank(), comm.size(), |_| 3).unwrap();
            write_flat_single(&comm, &single, &local).unwrap();
            write_flat_collective(&comm, &collective, &layout, &local).unwrap();
        });

        let expected = vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3];
        assert_eq!(read_flat::<i32>(&single).unwrap(), expected);
        assert_eq!(read_flat::<i32>(&collective).unwrap(), expected);
    }

    #[test]
    fn uneven_contributions_land_at_their_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uneven.dat");
        LocalGroup::run(3, |comm| {
            let rank = comm.rank();
            let local = vec![rank as u16 + 1; rank * 2];
            let layout = Layout::resolve(rank, comm.size(), |r| r as i64 * 2).unwrap();
            write_flat_collective(&comm, &path, &layout, &local).unwrap();
        });
        assert_eq!(read_flat::<u16>(&path).unwrap(), vec![2, 2, 3, 3, 3, 3]);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.dat");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        assert!(matches!(
            read_flat::<i32>(&path),
            Err(Error::SelectionMismatch(_))
        ));
    }
}
