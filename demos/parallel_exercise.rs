//! Rank r writes r + 1 copies of its rank; the dataset holds 0, 1, 1, 2, 2, 2, ...
//!
//! Run with: PARIO_WORKERS=4 PARIO_OUTPUT=stuff.pario cargo run --example parallel_exercise

use simple_pario::config::RunConfig;
use simple_pario::group::{Communicator, World};
use simple_pario::writer::CollectiveWriter;

fn run() -> simple_pario::Result<()> {
    let config = RunConfig::from_env()?;
    let world = World::init(config.workers)?;
    let config = config.agree(&world)?;

    let rank = world.rank();
    let local = vec![rank as i32; rank + 1];

    let writer = CollectiveWriter::new(&config.output, &config.dataset);
    let layout = writer.write(&world, &local, |r| r as i64 + 1)?;
    println!(
        "Rank {} wrote rows [{}, {}) of {}",
        rank, layout.offset, layout.offset + layout.extent, layout.global_extent
    );

    world.barrier()?;
    if rank == 0 {
        println!("{:?}", writer.read::<i32>()?);
    }

    world.finalize()?;
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("{}: {}", e.kind(), e);
        std::process::exit(1);
    }
}
