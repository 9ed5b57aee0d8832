//! infra-connect: bootstrap backend connectors and report their health.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml
//!       │
//!       ▼
//!   ┌─────────┐   per backend table   ┌──────────────────────┐
//!   │ config  │──────────────────────▶│ connector            │
//!   └─────────┘                       │  normalize → connect │
//!                                     │  → readiness probe   │
//!                                     └──────────┬───────────┘
//!                                                │ Registry::load
//!                                                ▼
//!   ┌──────────────┐   check_all   ┌──────────────────────────┐
//!   │ health       │◀─────────────▶│ registry                 │
//!   │ monitor      │               │ Arc<dyn Component> by id │
//!   └──────────────┘               └──────────────────────────┘
//! ```
//!
//! `check` runs one sweep and exits non-zero if any component is unhealthy.
//! `monitor` keeps sweeping until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use infra_connect::config::{load_config, BootstrapConfig};
use infra_connect::health::HealthMonitor;
use infra_connect::lifecycle::{self, signals, Shutdown};
use infra_connect::observability::{logging, metrics};
use infra_connect::registry::{ComponentReport, Registry};

#[derive(Parser)]
#[command(name = "infra-connect")]
#[command(about = "Bootstrap infrastructure connectors and report their health", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "infra-connect.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap every connector, run one liveness sweep and print a JSON report
    Check {
        /// Per-component liveness timeout in seconds (defaults to health_check.timeout_secs)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Also print the Prometheus exposition
        #[arg(long)]
        metrics: bool,
    },
    /// Bootstrap every connector and sweep periodically until interrupted
    Monitor,
}

#[derive(Serialize)]
struct CheckReport<'a> {
    healthy: bool,
    components: &'a [ComponentReport],
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    if let Err(e) = logging::init_logging(&config.observability.log_level) {
        eprintln!("logging already initialized: {}", e);
    }
    if config.observability.metrics_enabled {
        metrics::init_metrics()?;
    }

    tracing::info!(
        config = %cli.config.display(),
        connectors = config.connector_count(),
        "infra-connect v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let registry = Arc::new(Registry::new());
    let _connectors = lifecycle::bootstrap(&config, &registry);
    lifecycle::await_ready(&registry).await;

    let code = match cli.command {
        Commands::Check { timeout, metrics: dump } => check(&config, &registry, timeout, dump).await?,
        Commands::Monitor => {
            monitor(&config, Arc::clone(&registry)).await;
            ExitCode::SUCCESS
        }
    };

    lifecycle::shutdown_all(&registry).await;
    tracing::info!("Shutdown complete");
    Ok(code)
}

async fn check(
    config: &BootstrapConfig,
    registry: &Registry,
    timeout: Option<u64>,
    dump_metrics: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let timeout = Duration::from_secs(timeout.unwrap_or(config.health_check.timeout_secs));
    let reports = registry.check_all(timeout).await;
    for report in &reports {
        metrics::record_component_health(report.key, &report.id, report.is_live());
        metrics::record_readiness(report.key, &report.id, &report.readiness);
    }

    let healthy = reports.iter().all(ComponentReport::is_healthy);
    let report = CheckReport {
        healthy,
        components: &reports,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if dump_metrics {
        match metrics::render() {
            Some(text) => println!("{}", text),
            None => eprintln!("metrics are disabled in the configuration"),
        }
    }

    Ok(if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn monitor(config: &BootstrapConfig, registry: Arc<Registry>) {
    let shutdown = Shutdown::new();
    let monitor = HealthMonitor::new(registry, config.health_check.clone());
    let task = tokio::spawn(monitor.run(shutdown.subscribe()));

    signals::wait_for_signal().await;
    shutdown.trigger();

    if let Err(e) = task.await {
        tracing::error!(error = %e, "Health monitor task failed");
    }
}
