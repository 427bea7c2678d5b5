//! Compare writing a flat file through rank 0 against writing it collectively.
//!
//! Run with: PARIO_WORKERS=4 PARIO_ELEMENTS_PER_RANK=1000 cargo run --example collective_io

use simple_pario::config::RunConfig;
use simple_pario::group::{Communicator, World};
use simple_pario::layout::Layout;
use simple_pario::rawio::{read_flat, write_flat_collective, write_flat_single};
use std::path::Path;
use std::time::Instant;

fn report(
    world: &World,
    label: &str,
    path: &Path,
    started: Instant,
    elements_per_rank: usize,
) -> simple_pario::Result<()> {
    if world.rank() == 0 {
        println!("Time taken for '{}': {} seconds", label, started.elapsed().as_secs_f64());
        if elements_per_rank <= 10 {
            let contents: String = read_flat::<i32>(path)?.iter().map(|v| v.to_string()).collect();
            println!("File contents:\n{}", contents);
        }
        std::fs::remove_file(path)?;
    }
    Ok(())
}

fn run() -> simple_pario::Result<()> {
    let config = RunConfig::from_env()?;
    let world = World::init(config.workers)?;
    let config = config.agree(&world)?;
    let per_rank = config.elements_per_rank;

    if world.rank() == 0 {
        let bytes = per_rank * world.size() * std::mem::size_of::<i32>();
        println!("Writing {} integers from each rank.", per_rank);
        println!("Total bytes to write: {} ({} MB)", bytes, bytes / 1024 / 1024);
    }

    let data = vec![world.rank() as i32; per_rank];

    let path = Path::new("single_writer.dat");
    let started = Instant::now();
    write_flat_single(&world, path, &data)?;
    report(&world, "single_writer", path, started, per_rank)?;

    let path = Path::new("collective_write.dat");
    let layout = Layout::resolve(world.rank(), world.size(), |_| per_rank as i64)?;
    let started = Instant::now();
    write_flat_collective(&world, path, &layout, &data)?;
    report(&world, "collective_write", path, started, per_rank)?;

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
