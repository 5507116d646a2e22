mod args;
mod csv;

use std::fs::File;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use args::Args;
use bolt_downlinks::config::GenerationConfig;
use bolt_downlinks::delivery::Outcome;
use bolt_downlinks::logging;
use bolt_downlinks::output::write_json;
use bolt_downlinks::pipeline::run_generation;
use clap::Parser as _;
use tracing::error;

use crate::csv::CsvParameterIter;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = Args::parse();

    let config = GenerationConfig::load(&args.config)
        .with_context(|| format!("failed to load configuration: {:?}", args.config))?;

    let level = args
        .log_level
        .clone()
        .or_else(|| config.logging.level.clone())
        .unwrap_or_else(|| "info".to_owned());
    logging::init(&level, config.logging.logs_directory.as_deref(), args.timezone)
        .context("failed to initialize logging")?;

    let file = File::open(&config.input.filepath)
        .with_context(|| format!("failed to open file: {:?}", config.input.filepath))?;
    let records = CsvParameterIter::new(file, config.input.skip_rows)
        .context("failed to create CSV parameter iterator")?
        .collect::<Result<Vec<_>>>()
        .context("failed to parse parameter sheet")?;

    let (store, generation) =
        run_generation(&config, records).context("failed to generate downlinks")?;

    if let Some(path) = &args.report {
        write_json(path, &generation.report, 2)
            .with_context(|| format!("failed to write report: {path:?}"))?;
    }

    for (key, failure) in generation.report.failures() {
        error!(
            device = key,
            reason = failure.reason.as_deref().unwrap_or_default(),
            "no downlink generated"
        );
    }

    println!(
        "Generated {} downlink(s) into {:?} ({})",
        store.len(),
        config.output.filepath,
        generation.report.summary()
    );

    if generation.report.count(Outcome::Failed) > 0 {
        return Ok(ExitCode::from(2));
    }

    Ok(ExitCode::SUCCESS)
}
