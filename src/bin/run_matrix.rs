use std::path::Path;

use anyhow::Context;
use codec_bench::{
    errors, logging,
    matrix::{MatrixConfig, MatrixPaths, MatrixRunner},
    required_arg,
};

// usage: run_matrix <collection> <output_prefix> <query_basename> [config.json]
fn run() -> anyhow::Result<()> {
    use std::env;
    let args: Vec<String> = env::args().collect();
    let paths = MatrixPaths::new(
        required_arg(&args, 1, "collection")?,
        required_arg(&args, 2, "output_prefix")?,
        required_arg(&args, 3, "query_basename")?,
    );
    let config = match args.get(4) {
        Some(path) => MatrixConfig::load(Path::new(path)).context("loading matrix config")?,
        None => MatrixConfig::default_matrix(),
    };
    let runner = MatrixRunner::new(config, paths.clone())?;
    runner.check_inputs().context("checking matrix inputs")?;

    let report = runner.run()?;
    report
        .write_json(&paths.report())
        .context("writing job outcomes")?;
    let jobs: usize = report.rows.iter().map(|r| r.outcomes.len()).sum();
    eprintln!(
        "ran {} codecs, {} jobs, {} failed; outcomes in {}",
        report.rows.len(),
        jobs,
        report.failures().count(),
        paths.report().display()
    );
    report.into_result().context("running benchmark matrix")?;
    Ok(())
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        tracing::error!("{:#}", err);
        std::process::exit(errors::exit_code(&err));
    }
}
