use anyhow::{Context, Result};
use std::net::SocketAddr;
use tracing::{info, warn};

use bench_node::config::HarnessConfig;
use bench_node::harness::Harness;
use bench_node::report;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bench_node=info".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Bench Node v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration from file if available, otherwise use defaults
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default".to_string());
    let config = match HarnessConfig::from_file(&config_path) {
        Ok(config) => {
            info!(path = %config_path, "Configuration loaded");
            config
        }
        Err(e) => {
            warn!(path = %config_path, error = %e, "Failed to load config file, using defaults");
            HarnessConfig::default()
        }
    };

    if config.metrics.enabled {
        let listen_addr: SocketAddr = config
            .metrics
            .listen_addr
            .parse()
            .context("invalid metrics listen address")?;
        start_metrics_exporter(listen_addr)?;
    }
    report::initialize_metrics();

    let harness = Harness::new(config).context("invalid benchmark configuration")?;
    let reports = harness.run().await.context("benchmark run failed")?;

    for run in &reports {
        println!(
            "{}",
            serde_json::to_string_pretty(run).context("failed to serialize run report")?
        );
    }
    info!(runs = reports.len(), "All benchmarks finished");

    Ok(())
}

/// Install the Prometheus exporter serving scrape requests on `listen_addr`
fn start_metrics_exporter(listen_addr: SocketAddr) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    builder
        .with_http_listener(listen_addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(metrics_addr = %listen_addr, "Prometheus metrics exporter started");
    Ok(())
}
