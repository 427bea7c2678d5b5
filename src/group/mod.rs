//! Group runtime: the fixed set of cooperating workers.
//!
//! Every worker holds a [`Communicator`] that knows its own rank and the size of the group and
//! can take part in collective operations. Three runtimes are provided:
//!
//! - [`World`]: one process per rank, communicating over POSIX shared memory,
//! - [`LocalGroup`]: one thread per rank inside the current process,
//! - [`Solo`]: a group of exactly one worker, where every collective call returns immediately.
//!
//! Collective operations must be called by every worker of the group, in the same order.
//! A call does not return on any worker until all workers have issued it.

mod local;
mod solo;
mod world;

pub use local::{LocalComm, LocalGroup};
pub use solo::Solo;
pub use world::World;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroupError {
    #[error("Invalid rank: {0}")]
    InvalidRank(usize),
    #[error("Communication error: {0}")]
    CommunicationError(String),
    #[error("Initialization error: {0}")]
    InitError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Shared memory error: {0}")]
    SharedMemoryError(String),
    #[error("Process error: {0}")]
    ProcessError(String),
    #[error("Group aborted: a worker left before the collective operation completed")]
    Aborted,
}

pub type GroupResult<T> = std::result::Result<T, GroupError>;

/// A worker's view of its group.
pub trait Communicator {
    /// The rank of this worker, in `[0, size())`.
    fn rank(&self) -> usize;

    /// The number of workers in the group. Fixed for the lifetime of the group.
    fn size(&self) -> usize;

    /// Block until every worker in the group has called `barrier`.
    fn barrier(&self) -> GroupResult<()>;

    /// Contribute `bytes` and receive every worker's contribution, ordered by rank.
    fn all_gather_bytes(&self, bytes: &[u8]) -> GroupResult<Vec<Vec<u8>>>;

    /// Contribute `bytes`; the `root` worker receives every contribution ordered by rank.
    fn gather_bytes(&self, bytes: &[u8], root: usize) -> GroupResult<Option<Vec<Vec<u8>>>> {
        if root >= self.size() {
            return Err(GroupError::InvalidRank(root));
        }
        let all = self.all_gather_bytes(bytes)?;
        Ok((self.rank() == root).then_some(all))
    }

    /// Every worker receives the bytes supplied by `root`.
    fn broadcast_bytes(&self, bytes: &[u8], root: usize) -> GroupResult<Vec<u8>> {
        if root >= self.size() {
            return Err(GroupError::InvalidRank(root));
        }
        let mut all = self.all_gather_bytes(bytes)?;
        Ok(all.swap_remove(root))
    }

    /// Leave the group. Blocks until every worker has called `finalize`.
    fn finalize(self) -> GroupResult<()>
    where
        Self: Sized;
}

/// Typed collectives over any [`Communicator`], serialized with `bincode`.
pub trait CommunicatorExt: Communicator {
    fn all_gather<T: Serialize + DeserializeOwned>(&self, value: &T) -> GroupResult<Vec<T>> {
        let bytes = encode(value)?;
        self.all_gather_bytes(&bytes)?
            .iter()
            .map(|b| decode(b))
            .collect()
    }

    fn gather<T: Serialize + DeserializeOwned>(
        &self,
        value: &T,
        root: usize,
    ) -> GroupResult<Option<Vec<T>>> {
        let bytes = encode(value)?;
        match self.gather_bytes(&bytes, root)? {
            Some(all) => Ok(Some(all.iter().map(|b| decode(b)).collect::<GroupResult<_>>()?)),
            None => Ok(None),
        }
    }

    fn broadcast<T: Serialize + DeserializeOwned>(&self, value: &T, root: usize) -> GroupResult<T> {
        let bytes = encode(value)?;
        decode(&self.broadcast_bytes(&bytes, root)?)
    }
}

impl<C: Communicator + ?Sized> CommunicatorExt for C {}

fn encode<T: Serialize>(value: &T) -> GroupResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| GroupError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> GroupResult<T> {
    bincode::deserialize(bytes).map_err(|e| GroupError::SerializationError(e.to_string()))
}
