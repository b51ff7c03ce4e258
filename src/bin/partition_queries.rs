use std::path::Path;

use anyhow::Context;
use codec_bench::{
    errors, logging, optional_arg,
    partition::{PartitionStrategy, QueryLogPartitioner},
    required_arg,
};
use rand::Rng;

// usage: partition_queries <query_log> <output_dir> [seed]
fn run() -> anyhow::Result<()> {
    use std::env;
    let args: Vec<String> = env::args().collect();
    let input = required_arg(&args, 1, "query_log")?;
    let output_dir = required_arg(&args, 2, "output_dir")?;
    let seed: u64 = match optional_arg(&args, 3, "seed")? {
        Some(seed) => seed,
        None => rand::thread_rng().gen(),
    };
    let summary = QueryLogPartitioner::new(seed)
        .with_strategy(PartitionStrategy::InMemory)
        .partition(Path::new(input), Path::new(output_dir))
        .context("partitioning query log")?;
    eprintln!(
        "partitioned {} queries into {} files (seed {})",
        summary.lines,
        summary.files.len(),
        summary.seed
    );
    Ok(())
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        tracing::error!("{:#}", err);
        std::process::exit(errors::exit_code(&err));
    }
}
