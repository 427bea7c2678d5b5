use super::{Communicator, GroupResult};

/// A group with a single worker, rank 0.
///
/// Used for the single-writer case: every collective call completes immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct Solo;

impl Communicator for Solo {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> GroupResult<()> {
        Ok(())
    }

    fn all_gather_bytes(&self, bytes: &[u8]) -> GroupResult<Vec<Vec<u8>>> {
        Ok(vec![bytes.to_vec()])
    }

    fn finalize(self) -> GroupResult<()> {
        Ok(())
    }
}
