use super::{Communicator, GroupError, GroupResult};
use log::{debug, warn};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

struct GroupState {
    arrived: usize,
    generation: u64,
    departed: usize,
    slots: Vec<Vec<u8>>,
}

struct Shared {
    size: usize,
    state: Mutex<GroupState>,
    released: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, GroupState> {
        // A worker that panicked while holding the lock leaves the counters intact.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A group of worker threads inside the current process.
///
/// ```rust
/// use simple_pario::group::{Communicator, LocalGroup};
///
/// let ranks = LocalGroup::run(4, |comm| {
///     comm.barrier().unwrap();
///     comm.rank()
/// });
/// assert_eq!(ranks, vec![0, 1, 2, 3]);
/// ```
pub struct LocalGroup;

impl LocalGroup {
    /// Run `worker` once per rank, each on its own thread, and return the results ordered by rank.
    ///
    /// Panics raised by a worker are propagated once every thread has finished.
    pub fn run<F, R>(size: usize, worker: F) -> Vec<R>
    where
        F: Fn(LocalComm) -> R + Sync,
        R: Send,
    {
        Self::communicators(size)
            .map(|comms| {
                std::thread::scope(|scope| {
                    let handles: Vec<_> = comms
                        .into_iter()
                        .map(|comm| {
                            let worker = &worker;
                            scope.spawn(move || worker(comm))
                        })
                        .collect();
                    handles
                        .into_iter()
                        .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                        .collect()
                })
            })
            .unwrap_or_default()
    }

    /// Create the communicators of a new group of `size` workers, ordered by rank.
    pub fn communicators(size: usize) -> Option<Vec<LocalComm>> {
        if size == 0 {
            return None;
        }
        let shared = Arc::new(Shared {
            size,
            state: Mutex::new(GroupState {
                arrived: 0,
                generation: 0,
                departed: 0,
                slots: vec![Vec::new(); size],
            }),
            released: Condvar::new(),
        });
        Some(
            (0..size)
                .map(|rank| LocalComm {
                    rank,
                    shared: Arc::clone(&shared),
                    finalized: false,
                })
                .collect(),
        )
    }
}

/// One worker's handle on a [`LocalGroup`].
///
/// Dropping a `LocalComm` removes its worker from the group. Any collective call that is waiting
/// on that worker, or that starts afterwards, fails with [`GroupError::Aborted`].
pub struct LocalComm {
    rank: usize,
    shared: Arc<Shared>,
    finalized: bool,
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> GroupResult<()> {
        debug!("Rank {} entering barrier", self.rank);
        let mut state = self.shared.lock();
        if state.departed > 0 {
            return Err(GroupError::Aborted);
        }

        state.arrived += 1;
        if state.arrived == self.shared.size {
            state.arrived = 0;
            state.generation += 1;
            self.shared.released.notify_all();
        } else {
            let generation = state.generation;
            while state.generation == generation && state.departed == 0 {
                state = self
                    .shared
                    .released
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            if state.generation == generation {
                state.arrived -= 1;
                return Err(GroupError::Aborted);
            }
        }

        debug!("Rank {} exiting barrier", self.rank);
        Ok(())
    }

    fn all_gather_bytes(&self, bytes: &[u8]) -> GroupResult<Vec<Vec<u8>>> {
        // Slots are only written before the first barrier and only read between the two.
        self.shared.lock().slots[self.rank] = bytes.to_vec();
        self.barrier()?;
        let all = self.shared.lock().slots.clone();
        self.barrier()?;
        Ok(all)
    }

    fn finalize(mut self) -> GroupResult<()> {
        let result = self.barrier();
        self.finalized = true;
        debug!("Rank {} finalized", self.rank);
        result
    }
}

impl Drop for LocalComm {
    fn drop(&mut self) {
        if !self.finalized {
            warn!("Rank {} left the group without finalize", self.rank);
        }
        let mut state = self.shared.lock();
        state.departed += 1;
        self.shared.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_returns_results_in_rank_order() {
        let sizes = LocalGroup::run(5, |comm| (comm.rank(), comm.size()));
        assert_eq!(sizes, vec![(0, 5), (1, 5), (2, 5), (3, 5), (4, 5)]);
    }

    #[test]
    fn zero_workers_run_nothing() {
        let results: Vec<()> = LocalGroup::run(0, |_| panic!("no worker expected"));
        assert!(results.is_empty());
    }

    #[test]
    fn repeated_barriers_complete() {
        let results = LocalGroup::run(4, |comm| {
            for _ in 0..50 {
                comm.barrier()?;
            }
            comm.finalize()
        });
        assert!(results.iter().all(Result::is_ok));
    }

    #[test]
    fn departed_worker_aborts_pending_barrier() {
        let results = LocalGroup::run(3, |comm| {
            if comm.rank() == 1 {
                // Fails before reaching the collective call.
                return Err(GroupError::InitError("worker failed".into()));
            }
            comm.barrier()
        });
        assert!(matches!(results[0], Err(GroupError::Aborted)));
        assert!(matches!(results[1], Err(GroupError::InitError(_))));
        assert!(matches!(results[2], Err(GroupError::Aborted)));
    }

    #[test]
    fn all_gather_rounds_do_not_mix() {
        let results = LocalGroup::run(3, |comm| {
            let first = comm.all_gather_bytes(&[comm.rank() as u8]).unwrap();
            let second = comm.all_gather_bytes(&[comm.rank() as u8 + 100]).unwrap();
            (first, second)
        });
        for (first, second) in results {
            assert_eq!(first, vec![vec![0], vec![1], vec![2]]);
            assert_eq!(second, vec![vec![100], vec![101], vec![102]]);
        }
    }
}
