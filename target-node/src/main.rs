use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use target_node::{AppState, StoreSettings};

/// Target node configuration
#[derive(Debug, Clone, Deserialize)]
struct TargetNodeConfig {
    /// API listen address
    #[serde(default = "default_listen_addr")]
    listen_addr: String,
    /// Maximum age of a cached list snapshot, milliseconds
    #[serde(default = "default_cache_ttl_ms")]
    cache_ttl_ms: u64,
    /// Watch hub buffer per collection
    #[serde(default = "default_event_buffer")]
    event_buffer: usize,
    /// Metrics exporter settings
    #[serde(default)]
    metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct MetricsConfig {
    #[serde(default)]
    enabled: bool,
    #[serde(default = "default_metrics_listen_addr")]
    listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

impl Default for TargetNodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cache_ttl_ms: default_cache_ttl_ms(),
            event_buffer: default_event_buffer(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8100".to_string()
}

fn default_cache_ttl_ms() -> u64 {
    500
}

fn default_event_buffer() -> usize {
    4096
}

fn default_metrics_listen_addr() -> String {
    "127.0.0.1:9092".to_string()
}

impl TargetNodeConfig {
    /// Load configuration from file with environment overrides
    fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("TARGET_NODE"))
            .build()?;

        settings.try_deserialize()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "target_node=info".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Target Node v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/target-node".to_string());
    let config = match TargetNodeConfig::from_file(&config_path) {
        Ok(config) => {
            info!(path = %config_path, "Configuration loaded");
            config
        }
        Err(e) => {
            warn!(path = %config_path, error = %e, "Failed to load config file, using defaults");
            TargetNodeConfig::default()
        }
    };

    if config.metrics.enabled {
        let metrics_addr: SocketAddr = config
            .metrics
            .listen_addr
            .parse()
            .context("invalid metrics listen address")?;
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(metrics_addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(metrics_addr = %metrics_addr, "Prometheus metrics exporter started");
    }

    let state = AppState::new(StoreSettings {
        cache_ttl: Duration::from_millis(config.cache_ttl_ms),
        event_buffer: config.event_buffer,
    });

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen_addr))?;

    target_node::serve(listener, state).await
}
