//! The process runtime spawns copies of the running executable, so this binary holds exactly one
//! test and every copy runs it with the same arguments.
//!
//! Run with: cargo test --test world -- --ignored

use simple_pario::group::{Communicator, World};
use simple_pario::layout::{partitions, Layout};
use simple_pario::CommunicatorExt;

#[test]
#[ignore = "spawns worker processes"]
fn processes_agree_on_collectives() {
    let _ = env_logger::builder().is_test(true).try_init();
    let world = World::init(3).unwrap();
    let rank = world.rank();

    let ranks: Vec<usize> = world.all_gather(&rank).unwrap();
    assert_eq!(ranks, vec![0, 1, 2]);

    let gathered = world.gather_bytes(&[rank as u8; 2], 0).unwrap();
    if rank == 0 {
        assert_eq!(gathered, Some(vec![vec![0, 0], vec![1, 1], vec![2, 2]]));
    } else {
        assert_eq!(gathered, None);
    }

    let root_says: String = CommunicatorExt::broadcast(&world, &format!("from {rank}"), 2).unwrap();
    assert_eq!(root_says, "from 2");

    let layout = Layout::exchange(&world, rank as u64 + 1).unwrap();
    assert_eq!(layout, partitions(3, |r| r as i64 + 1).unwrap()[rank]);

    world.barrier().unwrap();
    world.finalize().unwrap();
}
