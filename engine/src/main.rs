//! Vigil monitoring engine service entry point
//!
//! Runs the engine with the built-in simulated drivers: registers a set
//! of demo subjects, starts their sampling tasks, and reports aggregate
//! statistics on shutdown.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vigil_engine::{EngineConfig, MonitoringEngine, Result};

/// Vigil monitoring engine command line interface
#[derive(Parser)]
#[command(name = "vigil-engine")]
#[command(about = "Real-time multi-source telemetry monitoring and alerting engine")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run the engine with simulated demo sources
    Run {
        /// Number of demo subjects to monitor
        #[arg(long, default_value_t = 2)]
        subjects: usize,

        /// Stop after this many seconds instead of waiting for ctrl-c
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(&cli) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let config = match EngineConfig::load_with_fallback(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Run { subjects, duration }) => run_engine(config, subjects, duration).await,
        Some(Commands::Config { show }) => show_config(config, show),
        None => run_engine(config, 2, None).await,
    };

    if let Err(e) = result {
        error!("vigil-engine failed: {}", e);
        process::exit(1);
    }
}

fn initialize_logging(cli: &Cli) -> std::result::Result<(), String> {
    let filter = EnvFilter::try_from_env("VIGIL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| e.to_string())
}

/// Register simulated sources for the demo subjects and run until
/// ctrl-c or the optional duration elapses
async fn run_engine(config: EngineConfig, subjects: usize, duration: Option<u64>) -> Result<()> {
    info!("Starting Vigil monitoring engine");
    let engine = MonitoringEngine::new(config)?;

    for n in 1..=subjects {
        let subject_id = format!("subject-{:03}", n);
        for class in ["pulse_oximeter", "blood_pressure", "temperature"] {
            let source_id = format!("{}-{}", subject_id, class);
            engine
                .register_source(&source_id, class, &subject_id)
                .await?;
        }
        let started = engine.start(&subject_id).await?;
        info!(subject_id = %subject_id, sources = started, "demo subject monitored");
    }

    match duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(seconds = secs, "run duration elapsed");
                }
            }
        }
        None => {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        }
    }

    engine.shutdown().await;

    let stats = engine.statistics().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn show_config(config: EngineConfig, show: bool) -> Result<()> {
    config.validate().map_err(vigil_engine::EngineError::from)?;
    info!("Configuration is valid");
    if show {
        match toml::to_string_pretty(&config) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => {
                return Err(vigil_engine::EngineError::from(
                    vigil_engine::ConfigError::ParseError {
                        reason: e.to_string(),
                    },
                ))
            }
        }
    }
    Ok(())
}
