//! Multi-process group runtime over POSIX shared memory.
//!
//! The launching process becomes rank 0 and spawns `size - 1` copies of the current executable.
//! Each copy calls [`World::init`] with the same size and claims a free rank. Every ordered pair of
//! ranks owns one message slot in a shared segment; a slot holds one message at a time and the
//! sender blocks until the receiver has taken it.

use super::{Communicator, GroupError, GroupResult};
use log::debug;
use serde::{de::DeserializeOwned, Serialize};
use shared_memory::{Shmem, ShmemConf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const MAX_MSG_SIZE: usize = 1024 * 1024; // 1MB max message size
const HEADER_SIZE: usize = std::mem::size_of::<MessageHeader>();
const SHM_NAME: &str = "simple_pario_world";
const SPAWNED_ENV: &str = "PARIO_SPAWNED";

/// Largest group a [`World`] can hold.
pub const MAX_RANKS: usize = 32;

#[repr(C)]
struct MessageHeader {
    valid: AtomicBool,
    received: AtomicBool,
    tag: i32,
    source: i32,
    size: usize,
}

impl MessageHeader {
    fn new() -> Self {
        Self {
            valid: AtomicBool::new(false),
            received: AtomicBool::new(false),
            tag: 0,
            source: -1,
            size: 0,
        }
    }
}

#[repr(C)]
struct SharedState {
    size: AtomicUsize,
    process_ids: [AtomicUsize; MAX_RANKS], // Process IDs for each rank
    init_flags: [AtomicBool; MAX_RANKS],   // Flags for initialization synchronization
    done_flags: [AtomicBool; MAX_RANKS],   // Flags for shutdown synchronization
    root_done: AtomicBool,
    cleanup_ready: [AtomicBool; MAX_RANKS],
    cleanup_done: AtomicBool,
}

/// A group of worker processes on one machine.
///
/// # Examples
///
/// ```rust,no_run
/// use simple_pario::group::{Communicator, World};
///
/// let world = World::init(4).unwrap();
/// println!("Process {} of {}", world.rank(), world.size());
/// world.barrier().unwrap();
/// world.finalize().unwrap();
/// ```
pub struct World {
    rank: usize,
    size: usize,
    shmem: Shmem,
}

impl World {
    /// Initialize the group runtime.
    ///
    /// Called by the launching process, this creates the shared segment, spawns `size - 1` copies
    /// of the current executable and blocks until every copy has claimed a rank. Called inside a
    /// spawned copy, it attaches to the existing segment instead.
    ///
    /// # Arguments
    ///
    /// * `size` - The total number of processes, between 1 and [`MAX_RANKS`]
    ///
    /// # Returns
    ///
    /// * `Ok(World)` - A new World instance if initialization succeeds
    /// * `Err(GroupError)` - If the size is invalid or the shared segment or a process could not be created
    pub fn init(size: usize) -> GroupResult<Self> {
        if size == 0 || size > MAX_RANKS {
            return Err(GroupError::InitError(format!(
                "Size must be between 1 and {MAX_RANKS}, got {size}"
            )));
        }

        if std::env::var_os(SPAWNED_ENV).is_some() {
            return Self::init_spawned(size);
        }

        debug!("Initializing group with {} processes", size);

        // One slot for each possible src->dst pair
        let state_size = std::mem::size_of::<SharedState>();
        let total_slots = size * size;
        let total_size = state_size + total_slots * (HEADER_SIZE + MAX_MSG_SIZE);

        debug!("Creating shared memory of size {}", total_size);

        let shmem = ShmemConf::new()
            .size(total_size)
            .flink(SHM_NAME)
            .create()
            .map_err(|e| GroupError::SharedMemoryError(e.to_string()))?;

        debug!("shmem path {:?}", shmem.get_flink_path());

        unsafe {
            let state = &*(shmem.as_ptr() as *const SharedState);
            state.size.store(size, Ordering::SeqCst);
            state.root_done.store(false, Ordering::SeqCst);
            state.cleanup_done.store(false, Ordering::SeqCst);
            for i in 0..MAX_RANKS {
                state.process_ids[i].store(0, Ordering::SeqCst);
                state.init_flags[i].store(false, Ordering::SeqCst);
                state.done_flags[i].store(false, Ordering::SeqCst);
                state.cleanup_ready[i].store(false, Ordering::SeqCst);
            }
            state.process_ids[0].store(std::process::id() as usize, Ordering::SeqCst);
            state.init_flags[0].store(true, Ordering::SeqCst);

            let base_ptr = shmem.as_ptr().add(state_size);
            for i in 0..total_slots {
                let header_ptr = base_ptr.add(i * (HEADER_SIZE + MAX_MSG_SIZE)) as *mut MessageHeader;
                std::ptr::write(header_ptr, MessageHeader::new());
            }
        }

        let exe = std::env::current_exe().map_err(|e| GroupError::ProcessError(e.to_string()))?;
        for _ in 1..size {
            Command::new(&exe)
                .args(std::env::args_os().skip(1))
                .env(SPAWNED_ENV, "1")
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .spawn()
                .map_err(|e| GroupError::ProcessError(e.to_string()))?;
        }

        debug!("Parent process initialized as rank 0");

        let world = World {
            rank: 0,
            size,
            shmem,
        };
        world.wait_all(&world.state().init_flags);
        Ok(world)
    }

    fn init_spawned(size: usize) -> GroupResult<Self> {
        debug!("Spawned process initializing");

        let shmem = ShmemConf::new()
            .flink(SHM_NAME)
            .open()
            .map_err(|e| GroupError::SharedMemoryError(e.to_string()))?;

        let mut world = World {
            rank: 0,
            size,
            shmem,
        };

        let shared_size = world.state().size.load(Ordering::SeqCst);
        if shared_size != size {
            return Err(GroupError::InitError(format!(
                "Spawned with size {size} but the group has size {shared_size}"
            )));
        }

        // Claim a rank by swapping our process ID into the first free slot
        let pid = std::process::id() as usize;
        let rank = (1..size)
            .find(|&i| {
                world.state().process_ids[i]
                    .compare_exchange(0, pid, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            })
            .ok_or_else(|| GroupError::InitError(format!("No available ranks for process {pid}")))?;
        world.rank = rank;
        debug!("Process {} initialized as rank {}", pid, rank);

        world.state().init_flags[rank].store(true, Ordering::SeqCst);
        world.wait_all(&world.state().init_flags);
        Ok(world)
    }

    fn state(&self) -> &SharedState {
        unsafe { &*(self.shmem.as_ptr() as *const SharedState) }
    }

    /// Spin until every rank has raised its flag in `flags`.
    fn wait_all(&self, flags: &[AtomicBool; MAX_RANKS]) {
        while !flags[..self.size].iter().all(|f| f.load(Ordering::SeqCst)) {
            std::hint::spin_loop();
        }
    }

    fn slot_ptr(&self, src: usize, dst: usize) -> *mut u8 {
        let state_size = std::mem::size_of::<SharedState>();
        let slot_size = HEADER_SIZE + MAX_MSG_SIZE;
        let slot_index = src * self.size + dst;
        unsafe { self.shmem.as_ptr().add(state_size + slot_index * slot_size) }
    }

    /// Send data to a specific rank (blocking until received).
    ///
    /// # Arguments
    ///
    /// * `data` - The data to send (must implement Serialize)
    /// * `dest` - The rank of the destination process
    /// * `tag` - A message identifier (useful for matching specific sends/receives)
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the send succeeds
    /// * `Err(GroupError)` - If the rank is invalid, serialization fails or the message is too large
    pub fn send<T: Serialize + ?Sized>(&self, data: &T, dest: usize, tag: i32) -> GroupResult<()> {
        if dest >= self.size {
            return Err(GroupError::InvalidRank(dest));
        }

        debug!("Rank {} sending to rank {} with tag {}", self.rank, dest, tag);

        let serialized =
            bincode::serialize(data).map_err(|e| GroupError::SerializationError(e.to_string()))?;

        if serialized.len() > MAX_MSG_SIZE {
            return Err(GroupError::CommunicationError(format!(
                "Message of {} bytes exceeds the {} byte slot",
                serialized.len(),
                MAX_MSG_SIZE
            )));
        }

        let slot_ptr = self.slot_ptr(self.rank, dest);
        let header = unsafe { &mut *(slot_ptr as *mut MessageHeader) };

        while header.valid.load(Ordering::SeqCst) {
            std::hint::spin_loop();
        }

        unsafe {
            header.tag = tag;
            header.source = self.rank as i32;
            header.size = serialized.len();
            header.received.store(false, Ordering::SeqCst);

            let data_ptr = slot_ptr.add(HEADER_SIZE);
            std::ptr::copy_nonoverlapping(serialized.as_ptr(), data_ptr, serialized.len());
        }

        header.valid.store(true, Ordering::SeqCst);

        debug!("Rank {} waiting for acknowledgment from rank {}", self.rank, dest);
        while !header.received.load(Ordering::SeqCst) {
            std::hint::spin_loop();
        }

        debug!("Rank {} completed send to rank {}", self.rank, dest);
        Ok(())
    }

    /// Receive data from a specific rank.
    ///
    /// Blocks until a message with the specified tag arrives from the source process.
    ///
    /// # Arguments
    ///
    /// * `source` - The rank of the sending process
    /// * `tag` - The message identifier to match
    pub fn recv<T: DeserializeOwned>(&self, source: usize, tag: i32) -> GroupResult<T> {
        if source >= self.size {
            return Err(GroupError::InvalidRank(source));
        }

        debug!("Rank {} receiving from rank {} with tag {}", self.rank, source, tag);

        let slot_ptr = self.slot_ptr(source, self.rank);
        let header = unsafe { &mut *(slot_ptr as *mut MessageHeader) };

        while !header.valid.load(Ordering::SeqCst)
            || header.source != source as i32
            || header.tag != tag
        {
            std::hint::spin_loop();
        }

        let result = unsafe {
            let data_ptr = slot_ptr.add(HEADER_SIZE);
            let data = std::slice::from_raw_parts(data_ptr, header.size);
            bincode::deserialize(data).map_err(|e| GroupError::SerializationError(e.to_string()))
        };

        // Acknowledge receipt and mark slot as free
        header.received.store(true, Ordering::SeqCst);
        header.valid.store(false, Ordering::SeqCst);

        debug!("Rank {} completed receive from rank {}", self.rank, source);
        result
    }

    /// Broadcast data from root rank to all other ranks.
    ///
    /// This is a collective operation that must be called by all processes with the same root rank.
    pub fn broadcast<T: Serialize + DeserializeOwned + Clone>(
        &self,
        data: &T,
        root: usize,
    ) -> GroupResult<T> {
        if root >= self.size {
            return Err(GroupError::InvalidRank(root));
        }

        debug!("Rank {} entering broadcast", self.rank);

        let result = if self.rank == root {
            for rank in (0..self.size).filter(|&r| r != root) {
                self.send(data, rank, 0)?;
            }
            Ok(data.clone())
        } else {
            self.recv(root, 0)
        };

        debug!("Rank {} completed broadcast", self.rank);
        result
    }

    /// Gather data from all ranks to root rank, ordered by rank.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Vec<T>))` - Vector of gathered data (only on root process)
    /// * `Ok(None)` - On non-root processes
    /// * `Err(GroupError)` - If the gather fails
    pub fn gather<T: Serialize + DeserializeOwned + Clone>(
        &self,
        data: &T,
        root: usize,
    ) -> GroupResult<Option<Vec<T>>> {
        if root >= self.size {
            return Err(GroupError::InvalidRank(root));
        }

        debug!("Rank {} entering gather", self.rank);

        let result = if self.rank == root {
            let mut result = Vec::with_capacity(self.size);
            for rank in 0..self.size {
                if rank == root {
                    result.push(data.clone());
                } else {
                    debug!("Root receiving from rank {}", rank);
                    result.push(self.recv(rank, 0)?);
                }
            }
            Some(result)
        } else {
            debug!("Rank {} sending to root", self.rank);
            self.send(data, root, 0)?;
            None
        };

        self.barrier()?;

        debug!("Rank {} completed gather", self.rank);
        Ok(result)
    }
}

impl Communicator for World {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) -> GroupResult<()> {
        const BARRIER_ARRIVE_TAG: i32 = -1;
        const BARRIER_COMPLETE_TAG: i32 = -2;

        debug!("Rank {} entering barrier", self.rank);

        // First phase: everyone reports to root. Second phase: root releases everyone.
        if self.rank == 0 {
            for rank in 1..self.size {
                self.recv::<()>(rank, BARRIER_ARRIVE_TAG)?;
            }
            for rank in 1..self.size {
                self.send(&(), rank, BARRIER_COMPLETE_TAG)?;
            }
        } else {
            self.send(&(), 0, BARRIER_ARRIVE_TAG)?;
            self.recv::<()>(0, BARRIER_COMPLETE_TAG)?;
        }

        debug!("Rank {} exiting barrier", self.rank);
        Ok(())
    }

    fn all_gather_bytes(&self, bytes: &[u8]) -> GroupResult<Vec<Vec<u8>>> {
        let gathered = self.gather(&bytes.to_vec(), 0)?.unwrap_or_default();
        self.broadcast(&gathered, 0)
    }

    fn gather_bytes(&self, bytes: &[u8], root: usize) -> GroupResult<Option<Vec<Vec<u8>>>> {
        self.gather(&bytes.to_vec(), root)
    }

    fn broadcast_bytes(&self, bytes: &[u8], root: usize) -> GroupResult<Vec<u8>> {
        self.broadcast(&bytes.to_vec(), root)
    }

    /// Synchronize process shutdown and release the shared segment.
    ///
    /// Rank 0 owns the segment and unmaps it last, once every other rank has signalled it is done.
    fn finalize(self) -> GroupResult<()> {
        let state = self.state();

        state.cleanup_ready[self.rank].store(true, Ordering::SeqCst);
        self.wait_all(&state.cleanup_ready);

        if self.rank == 0 {
            state.cleanup_done.store(true, Ordering::SeqCst);
            debug!("Parent process waiting for children to finish");
            while !(1..self.size).all(|i| state.done_flags[i].load(Ordering::SeqCst)) {
                std::hint::spin_loop();
            }
            state.root_done.store(true, Ordering::SeqCst);
        } else {
            while !state.cleanup_done.load(Ordering::SeqCst) {
                std::hint::spin_loop();
            }
            state.done_flags[self.rank].store(true, Ordering::SeqCst);
            while !state.root_done.load(Ordering::SeqCst) {
                std::hint::spin_loop();
            }
        }

        debug!("Process {} finished", self.rank);
        Ok(())
    }
}
