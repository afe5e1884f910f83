//! Node binary

use clap::{Parser, Subcommand};
use sensorkv::common::parse_duration;
use sensorkv::{Config, SensorNode};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sensorkv-node")]
#[command(about = "sensorkv node: coordinator, receivers and self-healing managers")]
#[command(version = sensorkv::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node until Ctrl-C
    Serve {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Node ID
        #[arg(long)]
        id: Option<String>,

        /// Replica sync period (e.g. 500ms, 5s)
        #[arg(long, value_parser = parse_duration_arg)]
        sync_interval: Option<Duration>,

        /// Health check period
        #[arg(long, value_parser = parse_duration_arg)]
        health_interval: Option<Duration>,

        /// Status dump period
        #[arg(long, default_value = "30s", value_parser = parse_duration_arg)]
        status_interval: Duration,
    },
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            id,
            sync_interval,
            health_interval,
            status_interval,
        } => {
            // File and environment first, CLI flags override
            let mut config = Config::load(config.as_deref())?;
            if let Some(id) = id {
                config.node_id = id;
            }
            if let Some(interval) = sync_interval {
                config.replication.sync_interval_ms = interval.as_millis() as u64;
            }
            if let Some(interval) = health_interval {
                config.fault_tolerance.health_check_interval_ms = interval.as_millis() as u64;
            }
            config.validate()?;

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            tracing::info!("sensorkv {}", sensorkv::BUILD_INFO);

            let node = SensorNode::from_config(&config)?;
            node.serve(status_interval, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
            })
            .await?;
        }
    }

    Ok(())
}
