//! A single writer stores a 4 x 5 integer matrix with a scalar metadata attribute.
//!
//! Run with: cargo run --example write_matrix

use simple_pario::config::{RunConfig, OUTPUT_ENV};
use simple_pario::store::{ArrayFile, FileAccess};
use simple_pario::writer::CollectiveWriter;

const ROWS: u64 = 4;
const COLUMNS: u64 = 5;

fn run() -> simple_pario::Result<()> {
    let config = RunConfig {
        output: "matrix.pario".into(),
        ..RunConfig::default()
    }
    .with_overrides(|key| (key == OUTPUT_ENV).then(|| std::env::var(key).ok()).flatten())?;

    let matrix: Vec<i32> = (0..(ROWS * COLUMNS) as i32).collect();
    CollectiveWriter::new(&config.output, "IntegerMatrix")
        .with_row_shape(&[COLUMNS])
        .write_single_with_attribute(&matrix, "DummyMetadataInteger", 42i32)?;

    let access = FileAccess::independent();
    let file = ArrayFile::open(&config.output, &access)?;
    let dataset = file.dataset("IntegerMatrix")?;
    for r in 0..ROWS {
        let row = (0..COLUMNS)
            .map(|c| dataset.read_element::<i32>(&[r, c]))
            .collect::<simple_pario::Result<Vec<_>>>()?;
        println!("{:?}", row);
    }
    println!(
        "DummyMetadataInteger = {}",
        dataset.read_scalar_attribute::<i32>("DummyMetadataInteger")?
    );
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("{}: {}", e.kind(), e);
        std::process::exit(1);
    }
}
