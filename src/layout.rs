//! Global layout of a rank-partitioned dataset.
//!
//! Every worker contributes a contiguous run of rows. Rank `r` starts at the sum of the
//! contribution sizes of all lower ranks, so the runs tile `[0, global_extent)` in rank order.

use crate::error::{Error, Result};
use crate::group::{Communicator, CommunicatorExt};
use log::debug;

/// Where one worker's contribution lands in the shared dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Total rows contributed by the whole group.
    pub global_extent: u64,
    /// First row owned by this worker.
    pub offset: u64,
    /// Number of rows owned by this worker.
    pub extent: u64,
}

impl Layout {
    /// Resolve the layout of `rank` from a contribution-size function shared by every worker.
    ///
    /// `contribution` must be deterministic and identical on every worker; no communication is
    /// used to agree on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `contribution` is negative for any rank in
    /// `[0, world_size)`, and [`Error::InvalidConfig`] if `rank` is not below `world_size` or the
    /// sizes add up to more than `u64::MAX` rows.
    pub fn resolve<F>(rank: usize, world_size: usize, contribution: F) -> Result<Self>
    where
        F: Fn(usize) -> i64,
    {
        let sizes = (0..world_size)
            .map(|r| match contribution(r) {
                value if value < 0 => Err(Error::Configuration { rank: r, value }),
                value => Ok(value as u64),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_sizes(rank, &sizes)
    }

    /// Resolve the layout of `rank` from the contribution sizes of every rank, ordered by rank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `rank` is outside the group or the sizes add up to more
    /// than `u64::MAX` rows.
    pub fn from_sizes(rank: usize, sizes: &[u64]) -> Result<Self> {
        if rank >= sizes.len() {
            return Err(Error::InvalidConfig(format!(
                "rank {rank} is outside a group of {} workers",
                sizes.len()
            )));
        }
        let total = |sizes: &[u64]| {
            sizes
                .iter()
                .try_fold(0u64, |acc, &size| acc.checked_add(size))
                .ok_or_else(|| {
                    Error::InvalidConfig(format!(
                        "contribution sizes {sizes:?} add up to more than {} rows",
                        u64::MAX
                    ))
                })
        };
        let layout = Layout {
            global_extent: total(sizes)?,
            offset: total(&sizes[..rank])?,
            extent: sizes[rank],
        };
        debug!("Rank {} resolved {:?}", rank, layout);
        Ok(layout)
    }

    /// Resolve the layout by exchanging every worker's local size with the group.
    ///
    /// Use this when contribution sizes are not a closed-form function of the rank. This is a
    /// collective operation.
    pub fn exchange<C: Communicator + ?Sized>(comm: &C, local_len: u64) -> Result<Self> {
        let sizes: Vec<u64> = comm.all_gather(&local_len)?;
        Self::from_sizes(comm.rank(), &sizes)
    }

    /// The half-open row range `[offset, offset + extent)` owned by this worker.
    pub fn range(&self) -> std::ops::Range<u64> {
        self.offset..self.offset + self.extent
    }
}

/// The layouts of every rank in a group of `world_size` workers, ordered by rank.
pub fn partitions<F>(world_size: usize, contribution: F) -> Result<Vec<Layout>>
where
    F: Fn(usize) -> i64,
{
    (0..world_size)
        .map(|rank| Layout::resolve(rank, world_size, &contribution))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::LocalGroup;

    fn assert_tiles(layouts: &[Layout]) {
        let mut next = 0;
        for layout in layouts {
            assert_eq!(layout.offset, next);
            next += layout.extent;
        }
        for layout in layouts {
            assert_eq!(layout.global_extent, next);
        }
    }

    #[test]
    fn rank_plus_one_sizes_tile_the_extent() {
        let layouts = partitions(4, |r| r as i64 + 1).unwrap();
        assert_tiles(&layouts);
        assert_eq!(layouts[0].range(), 0..1);
        assert_eq!(layouts[1].range(), 1..3);
        assert_eq!(layouts[2].range(), 3..6);
        assert_eq!(layouts[3].range(), 6..10);
        assert_eq!(layouts[3].global_extent, 10);
    }

    #[test]
    fn tiling_holds_for_many_sizes() {
        let sizes: [fn(usize) -> i64; 4] = [
            |_| 0,
            |r| (r % 3) as i64,
            |r| (r * r) as i64,
            |r| if r % 2 == 0 { 7 } else { 0 },
        ];
        for world_size in 1..=16 {
            for size in sizes {
                assert_tiles(&partitions(world_size, size).unwrap());
            }
        }
    }

    #[test]
    fn single_worker_owns_everything() {
        let layout = Layout::resolve(0, 1, |_| 20).unwrap();
        assert_eq!(
            layout,
            Layout {
                global_extent: 20,
                offset: 0,
                extent: 20
            }
        );
    }

    #[test]
    fn negative_size_is_a_configuration_error() {
        let err = Layout::resolve(0, 4, |r| if r == 2 { -1 } else { 1 }).unwrap_err();
        assert!(matches!(err, Error::Configuration { rank: 2, value: -1 }));
        assert_eq!(err.kind(), "ConfigurationError");
    }

    #[test]
    fn rank_outside_group_is_rejected() {
        assert!(matches!(
            Layout::resolve(4, 4, |_| 1),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn sizes_past_the_largest_extent_are_rejected() {
        let err = Layout::resolve(0, 3, |_| i64::MAX).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(err.kind(), "ConfigurationError");

        let results = LocalGroup::run(2, |comm| Layout::exchange(&comm, u64::MAX));
        for result in results {
            assert!(matches!(result, Err(Error::InvalidConfig(_))));
        }

        let layout = Layout::from_sizes(1, &[u64::MAX - 1, 1]).unwrap();
        assert_eq!(layout.global_extent, u64::MAX);
        assert_eq!(layout.range(), u64::MAX - 1..u64::MAX);
    }

    #[test]
    fn exchange_matches_closed_form() {
        let layouts = LocalGroup::run(5, |comm| {
            Layout::exchange(&comm, comm.rank() as u64 + 1).unwrap()
        });
        assert_eq!(layouts, partitions(5, |r| r as i64 + 1).unwrap());
    }
}
