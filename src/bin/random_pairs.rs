use std::io;

use anyhow::Context;
use codec_bench::{
    errors, logging, optional_arg, parse_arg, required_arg, sampler::RandomPairSampler,
};
use rand::Rng;

// usage: random_pairs <count> <upper_bound> [seed] > pairs.tsv
fn run() -> anyhow::Result<()> {
    use std::env;
    let args: Vec<String> = env::args().collect();
    let count: usize = parse_arg(required_arg(&args, 1, "count")?, "count")?;
    let upper_bound: u64 = parse_arg(required_arg(&args, 2, "upper_bound")?, "upper_bound")?;
    let seed: u64 = match optional_arg(&args, 3, "seed")? {
        Some(seed) => seed,
        None => rand::thread_rng().gen(),
    };
    tracing::info!("sampling {} pairs below {} (seed {})", count, upper_bound, seed);
    let sampler = RandomPairSampler::seeded(count, upper_bound, seed)?;
    sampler
        .write_to(io::stdout().lock())
        .context("writing pairs to stdout")?;
    Ok(())
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        tracing::error!("{:#}", err);
        std::process::exit(errors::exit_code(&err));
    }
}
