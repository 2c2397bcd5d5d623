//! Recidivism Report - statistics pipeline
//!
//! Reshapes Korean government recidivism exports into tidy tables, builds the
//! summary tables and renders the presentation charts.

mod charts;
mod config;
mod data;
mod pipeline;
mod tables;
mod telemetry;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use config::PipelineConfig;

#[derive(Parser, Debug)]
#[command(
    name = "recidivism-report",
    about = "Tidy recidivism statistics, summary tables and charts",
    version
)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level or tracing filter (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Clean raw exports into tidy CSVs
    Preprocess,
    /// Build summary tables from the tidy CSVs
    Tables,
    /// Render the presentation figures from the tidy CSVs
    Figures,
    /// Run every stage in order
    All,
}

impl Command {
    fn name(self) -> &'static str {
        match self {
            Command::Preprocess => "preprocess",
            Command::Tables => "tables",
            Command::Figures => "figures",
            Command::All => "all",
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    telemetry::init(&config.log_level)?;

    let artifacts = match cli.command {
        Command::Preprocess => pipeline::preprocess(&config)?.1,
        Command::Tables => {
            let frames = pipeline::load_processed(&config)?;
            pipeline::make_tables(&frames, &config)?
        }
        Command::Figures => {
            let frames = pipeline::load_processed(&config)?;
            pipeline::make_figures(&frames, &config)?
        }
        Command::All => {
            let (frames, mut artifacts) = pipeline::preprocess(&config)?;
            artifacts.extend(pipeline::make_tables(&frames, &config)?);
            artifacts.extend(pipeline::make_figures(&frames, &config)?);
            artifacts
        }
    };

    if cli.command != Command::Preprocess {
        let manifest = pipeline::write_manifest(&config, cli.command.name(), &artifacts)?;
        info!(path = %manifest.display(), "manifest written");
    }
    info!(stage = cli.command.name(), artifacts = artifacts.len(), "done");
    Ok(())
}
