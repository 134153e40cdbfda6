//! Access-risk scoring pipeline.
//!
//! Loads demographics, boundaries and service points, flags municipalities
//! out of reach of each service, scores them and writes GeoJSON outputs.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hashbrown::HashMap;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use access_risk::enrich::{points_from_table, ScoreDistribution};
use access_risk::io::{load_table, read_boundaries, read_municipalities, BOUNDARY_KEY, TERRITORY_KEY};
use access_risk::models::{MunicipalitySet, SCORE_FLAGS};
use access_risk::pipeline::{self, GeoJsonCheckpoints, PipelineInput, ServiceInput};

use crate::config::Config;

/// Delimiter of the demographic extract.
const DEMOGRAPHICS_DELIMITER: u8 = b';';

#[derive(Parser, Debug)]
#[command(name = "score")]
#[command(about = "Score municipalities on access to pharmacies and hospitals")]
struct Args {
    /// Log per-record decisions (RUST_LOG, when set, takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline from the raw inputs
    Run {
        /// Pipeline configuration file
        #[arg(short, long, default_value = "pipeline.toml")]
        config: PathBuf,
    },
    /// Recompute scores from the scored checkpoint and rebuild the combined output
    Rescore {
        /// Pipeline configuration file
        #[arg(short, long, default_value = "pipeline.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Run { config } => run(&Config::load_from_file(&config)?),
        Command::Rescore { config } => rescore(&Config::load_from_file(&config)?),
    }
}

fn checkpoints(config: &Config) -> GeoJsonCheckpoints {
    let associations: HashMap<String, PathBuf> = config
        .services
        .iter()
        .filter_map(|s| s.association.clone().map(|path| (s.name.clone(), path)))
        .collect();

    GeoJsonCheckpoints {
        scored: config.outputs.scored.clone(),
        combined: config.outputs.combined.clone(),
        associations,
        output_crs: config.projection.output,
    }
}

fn read_territories(config: &Config) -> Result<Vec<MunicipalitySet>> {
    config
        .inputs
        .territories
        .iter()
        .map(|path| read_boundaries(path, TERRITORY_KEY))
        .collect()
}

fn run(config: &Config) -> Result<()> {
    info!("Access-risk pipeline");

    let demographics = load_table(&config.inputs.demographics, DEMOGRAPHICS_DELIMITER)?;
    let boundaries = read_boundaries(&config.inputs.boundaries, BOUNDARY_KEY)?;

    let mut services = Vec::with_capacity(config.services.len());
    for service in &config.services {
        let table = load_table(&service.points, service.delimiter_byte()?)
            .with_context(|| format!("Failed to load points for service '{}'", service.name))?;
        services.push(ServiceInput {
            name: service.name.clone(),
            points: points_from_table(&table, &service.geometry_column, config.projection.points),
            pass: service.pass(),
        });
    }

    let input = PipelineInput {
        demographics,
        boundaries,
        services,
        territories: read_territories(config)?,
    };

    let output = pipeline::run_pipeline(input, config.projection.projection(), &mut checkpoints(config))?;
    report(&output.distribution);
    info!(
        "Wrote {} municipalities to {}",
        output.combined.len(),
        config.outputs.combined.display()
    );
    Ok(())
}

fn rescore(config: &Config) -> Result<()> {
    let mut flags: Vec<String> = SCORE_FLAGS.iter().map(|f| f.to_string()).collect();
    for service in &config.services {
        if !flags.contains(&service.flag) {
            flags.push(service.flag.clone());
        }
    }

    let scored = read_municipalities(&config.outputs.scored, &flags)
        .with_context(|| format!("Failed to reload {}", config.outputs.scored.display()))?;

    let output = pipeline::rescore(
        scored,
        read_territories(config)?,
        config.projection.projection(),
        &mut checkpoints(config),
    )?;
    report(&output.distribution);
    Ok(())
}

fn report(distribution: &ScoreDistribution) {
    let total: usize = distribution.values().sum();
    let at_max = distribution.get(&(SCORE_FLAGS.len() as u8)).copied().unwrap_or(0);
    info!("Scored {} municipalities, {} with every risk flag", total, at_max);
}
