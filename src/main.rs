use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod error;
mod gbm;
mod model;
mod models;
mod report;
mod risk;
mod synthetic;
mod zones;

use config::Config;
use db::HistoryStore;
use error::RiskError;
use model::RiskModel;
use models::{HistoryRecord, ScoringResult};
use risk::{LiveReading, RiskScorer};
use zones::ZoneRegistry;

#[derive(Parser)]
#[command(name = "flood-risk-sentinel")]
#[command(about = "Flood risk scoring and alerting for Abidjan communes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone, Copy)]
struct ReadingArgs {
    /// Rainfall in mm/h
    #[arg(long, allow_negative_numbers = true)]
    rainfall: f64,
    /// Lagoon or river water level in metres
    #[arg(long, allow_negative_numbers = true)]
    river_level: f64,
    /// Soil saturation in percent
    #[arg(long, allow_negative_numbers = true)]
    soil_moisture: f64,
}

impl From<ReadingArgs> for LiveReading {
    fn from(args: ReadingArgs) -> Self {
        LiveReading {
            rainfall_mm: args.rainfall,
            river_level_m: args.river_level,
            soil_moisture_pct: args.soil_moisture,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the history schema
    InitDb,
    /// Write a synthetic labeled dataset
    Generate {
        #[arg(long, default_value_t = 2000)]
        rows: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value = "data/flood_data.csv")]
        out: PathBuf,
    },
    /// Train the classifier on a dataset
    Train {
        #[arg(long, default_value = "data/flood_data.csv")]
        data: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = model::DEFAULT_SPLIT_SEED)]
        seed: u64,
    },
    /// Score one zone against live readings
    Score {
        #[arg(long)]
        zone: String,
        #[command(flatten)]
        reading: ReadingArgs,
        /// Skip writing the assessment to history
        #[arg(long)]
        no_record: bool,
    },
    /// Score every zone against the same readings
    Overview {
        #[command(flatten)]
        reading: ReadingArgs,
    },
    /// Show the most recent assessments
    History {
        #[arg(long, default_value_t = 24)]
        limit: usize,
    },
    /// Write a markdown assessment report for one zone
    Report {
        #[arg(long)]
        zone: String,
        #[command(flatten)]
        reading: ReadingArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// List the static zone table
    Zones,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("flood_risk_sentinel=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    let cli = Cli::parse();

    match run(cli.command, &config).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            if let Some(risk_err) = err.downcast_ref::<RiskError>() {
                if risk_err.is_per_request() {
                    warn!("request rejected: {risk_err}");
                    eprintln!("{risk_err}");
                    return Ok(ExitCode::from(2));
                }
            }
            Err(err)
        }
    }
}

async fn run(command: Commands, config: &Config) -> anyhow::Result<()> {
    let registry = ZoneRegistry::abidjan();

    match command {
        Commands::InitDb => {
            let store = open_history(config).await?;
            store.close().await;
            println!("Schema ready.");
        }
        Commands::Generate { rows, seed, out } => {
            let examples = synthetic::generate(rows, seed)?;
            synthetic::write_csv(&out, &examples)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Wrote {} examples to {}.", examples.len(), out.display());
        }
        Commands::Train { data, out, seed } => {
            let examples = synthetic::read_csv(&data)?;
            let (model, report) = RiskModel::train(&examples, seed)?;
            let out = out.unwrap_or_else(|| config.model_path.clone());
            model.save(&out)?;
            match report.holdout_accuracy {
                Some(acc) => println!(
                    "Model trained on {} rows, holdout accuracy {:.2}% over {} rows.",
                    report.train_rows,
                    acc * 100.0,
                    report.holdout_rows
                ),
                None => println!("Model trained on {} rows.", report.train_rows),
            }
            println!("Model written to {}.", out.display());
        }
        Commands::Score {
            zone,
            reading,
            no_record,
        } => {
            let model = load_model(config)?;
            let result = RiskScorer::new(&registry, &model).score(&zone, reading.into())?;
            print_result(&result);

            if !no_record {
                let store = open_history(config).await?;
                store.append(&HistoryRecord::from_result(&result)).await?;
                store.close().await;
            }
        }
        Commands::Overview { reading } => {
            let model = load_model(config)?;
            let results = RiskScorer::new(&registry, &model).overview(reading.into())?;
            println!("All zones:");
            for result in &results {
                print_result(result);
            }
        }
        Commands::History { limit } => {
            let store = open_history(config).await?;
            let records = store.recent(limit).await?;
            let stored = store.len().await?;
            store.close().await;

            if records.is_empty() {
                println!("No assessments recorded yet.");
                return Ok(());
            }
            println!("Latest {} of {} stored assessments:", records.len(), stored);
            for record in &records {
                println!(
                    "- {} {} risk {:.1}% rainfall {} mm/h",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.zone_name,
                    record.probability * 100.0,
                    record.rainfall_mm
                );
            }
        }
        Commands::Report { zone, reading, out } => {
            let model = load_model(config)?;
            let result = RiskScorer::new(&registry, &model).score(&zone, reading.into())?;

            let store = open_history(config).await?;
            let history = store.recent(24).await?;
            store.close().await;

            let report = report::build_report(&result, &history);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Zones => {
            println!("{} zones:", registry.len());
            for zone in registry.list() {
                println!(
                    "- {} ({:.3}, {:.3}) elevation {} m, drainage {}, population {}",
                    zone.name,
                    zone.latitude,
                    zone.longitude,
                    zone.elevation_m,
                    zone.drainage_capacity,
                    zone.population
                );
            }
        }
    }

    Ok(())
}

fn load_model(config: &Config) -> anyhow::Result<RiskModel> {
    let model = RiskModel::load(&config.model_path)?;
    if let Some(acc) = model.holdout_accuracy() {
        info!(
            "serving model trained {} (holdout accuracy {:.2}%)",
            model.trained_at(),
            acc * 100.0
        );
    }
    Ok(model)
}

async fn open_history(config: &Config) -> anyhow::Result<HistoryStore> {
    let store = HistoryStore::connect(&config.database_url, config.history_retention).await?;
    store.init_db().await?;
    Ok(store)
}

fn print_result(result: &ScoringResult) {
    println!(
        "- {}: risk {:.1}% level {} exposed population {}",
        result.zone_name,
        result.probability * 100.0,
        result.alert_tier,
        result.exposed_population
    );
}
