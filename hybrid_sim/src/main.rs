// hybrid_sim/src/main.rs

use clap::Parser;
use hybrid_sim::cli::{Cli, Command, GenerateArgs, RunArgs};
use hybrid_sim::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    // --- 1. Logging ---
    // RUST_LOG wins; otherwise our own crates log at debug.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hybrid_sim=debug,hybrid_core=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // --- 2. Dispatch ---
    let cli = Cli::parse();
    let outcome = match &cli.command {
        Command::Run(args) => run(args),
        Command::Generate(args) => generate_dataset(args),
    };
    if let Err(e) = outcome {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &RunArgs) -> Result<(), SimError> {
    let mut config = ExperimentConfig::load(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate()?;
    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    info!(dataset = %args.dataset.display(), "loading dataset");
    let reader = BufReader::new(File::open(&args.dataset)?);
    let mut experiment = Experiment::new(config)?;
    let report = experiment.run(DatasetReader::new(reader))?;

    let mut out = BufWriter::new(File::create(&args.output)?);
    write_poses(&mut out, &report.result, report.last_pose)?;
    out.flush()?;
    info!(path = %args.output.display(), "poses written");

    let mut out = BufWriter::new(File::create(&args.timing_output)?);
    write_times(&mut out, &report.odometry_times)?;
    out.flush()?;
    info!(path = %args.timing_output.display(), "timings written");

    if let Some(path) = &args.update_timing_output {
        let mut out = BufWriter::new(File::create(path)?);
        write_update_times(&mut out, &report.update_times)?;
        out.flush()?;
        info!(path = %path.display(), updates = report.update_times.len(), "update timings written");
    }
    Ok(())
}

fn generate_dataset(args: &GenerateArgs) -> Result<(), SimError> {
    let data = generate(&GeneratorConfig::from(args))?;

    let mut out = BufWriter::new(File::create(&args.output)?);
    for record in &data.records {
        writeln!(out, "{record}")?;
    }
    out.flush()?;
    info!(path = %args.output.display(), records = data.records.len(), "dataset written");

    if let Some(path) = &args.ground_truth {
        let mut out = BufWriter::new(File::create(path)?);
        for pose in &data.ground_truth {
            writeln!(out, "{} {} {}", pose.x, pose.y, pose.theta)?;
        }
        out.flush()?;
        info!(path = %path.display(), "ground truth written");
    }
    Ok(())
}
