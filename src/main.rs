use clap::{Parser, Subcommand};
use geo_matcher::config::{LogFormat, Settings};
use geo_matcher::core::{BasicNormalizer, Matcher};
use geo_matcher::models::MatchSource;
use geo_matcher::services::{read_addresses, read_pois, run_validation};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "geo-matcher")]
#[command(about = "Batch matching of delivery addresses against geocoded POIs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match every address in the configured input against the POI catalog
    Match {
        /// Configuration file (toml, yaml or json)
        config: PathBuf,
    },

    /// Check the configuration and, optionally, the embedding model
    Validate {
        /// Configuration file (toml, yaml or json)
        config: PathBuf,

        /// Skip the embedding model check
        #[arg(long)]
        no_vector: bool,

        /// Sample text encoded during the model check
        #[arg(long)]
        sample: Option<String>,
    },
}

fn init_logging(settings: Option<&Settings>) {
    let level = settings
        .map(|s| s.runtime.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    let format = settings
        .map(|s| s.runtime.log_format)
        .unwrap_or(LogFormat::Pretty);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }
}

fn config_path(command: &Commands) -> &PathBuf {
    match command {
        Commands::Match { config } | Commands::Validate { config, .. } => config,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let settings = match Settings::load_from(config_path(&cli.command)) {
        Ok(settings) => settings,
        Err(e) => {
            init_logging(None);
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(Some(&settings));
    info!("Configuration loaded from {}", config_path(&cli.command).display());

    let outcome = match &cli.command {
        Commands::Match { .. } => run_match(&settings).await,
        Commands::Validate { no_vector, sample, .. } => {
            run_validation(&settings, !no_vector, sample.as_deref()).map_err(|e| e.to_string())
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            ExitCode::FAILURE
        }
    }
}

async fn run_match(settings: &Settings) -> Result<(), String> {
    let input = &settings.input;

    info!("Loading POIs and addresses");
    let pois = read_pois(&input.poi_file, input.poi_sheet.as_deref(), &settings.columns.poi)
        .map_err(|e| format!("Failed to read POIs: {}", e))?;
    let addresses = read_addresses(&input.address_file, input.address_sheet.as_deref(), &settings.columns.address)
        .map_err(|e| format!("Failed to read addresses: {}", e))?;

    let mut matcher = Matcher::new(settings.matching(), Arc::new(BasicNormalizer::new()));
    matcher.load(pois).map_err(|e| format!("Failed to build catalog: {}", e))?;

    info!("Matching started");
    let results = matcher
        .match_all(addresses)
        .await
        .map_err(|e| format!("Matching failed: {}", e))?;

    matcher
        .export(&results, &input.output_file)
        .map_err(|e| e.to_string())?;

    let matched = results.iter().filter(|r| r.is_matched()).count();
    let degraded = results.iter().filter(|r| r.source == MatchSource::Degraded).count();
    info!(
        "All done: {} results, {} matched, {} degraded",
        results.len(),
        matched,
        degraded
    );

    Ok(())
}
