//! Each process writes its own rank to a shared dataset of `size` elements.
//!
//! Run with: PARIO_WORKERS=4 cargo run --example parallel_ranks

use simple_pario::config::RunConfig;
use simple_pario::group::{Communicator, World};
use simple_pario::writer::CollectiveWriter;

fn run() -> simple_pario::Result<()> {
    let config = RunConfig::from_env()?;
    let world = World::init(config.workers)?;
    let config = config.agree(&world)?;

    let writer = CollectiveWriter::new(&config.output, "MPI_RANKS");
    writer.write(&world, &[world.rank() as i32], |_| 1)?;

    if world.rank() == 0 {
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
