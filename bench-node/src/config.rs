use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resource::{WIDGET_GROUP, WIDGET_RESOURCE, WIDGET_VERSION};

/// Main configuration for the bench node: one struct constructed per run and
/// passed into each component, never shared mutable state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Target API endpoint settings
    pub target: TargetConfig,
    /// Concurrency and deadline limits
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Metrics exporter settings
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Benchmarks executed in order, one report each
    pub benchmarks: Vec<BenchmarkSpec>,
}

/// Target API endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Base URL of the resource API
    pub base_url: String,
    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    /// Per-request timeout in seconds for unary calls; generous because bulk
    /// deletes of large collections are slow
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl TargetConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Concurrency and deadline limits applied to every benchmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Overall deadline for one convergence or measurement phase, seconds
    #[serde(default = "default_batch_timeout_seconds")]
    pub batch_timeout_seconds: u64,
    /// Deadline for all watch subscriptions to confirm open, seconds
    #[serde(default = "default_watch_open_timeout_seconds")]
    pub watch_open_timeout_seconds: u64,
    /// Deadline for each single event on a subscription, seconds
    #[serde(default = "default_watch_event_timeout_seconds")]
    pub watch_event_timeout_seconds: u64,
    /// Optional cap on simultaneous in-flight creates; unset leaves the
    /// backend's admission control as the only limit
    #[serde(default)]
    pub create_concurrency: Option<usize>,
}

impl LimitsConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_seconds)
    }

    pub fn watch_open_timeout(&self) -> Duration {
        Duration::from_secs(self.watch_open_timeout_seconds)
    }

    pub fn watch_event_timeout(&self) -> Duration {
        Duration::from_secs(self.watch_event_timeout_seconds)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            batch_timeout_seconds: default_batch_timeout_seconds(),
            watch_open_timeout_seconds: default_watch_open_timeout_seconds(),
            watch_event_timeout_seconds: default_watch_event_timeout_seconds(),
            create_concurrency: None,
        }
    }
}

/// Metrics exporter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter
    pub enabled: bool,
    /// Exporter listen address
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Which measurement a benchmark runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateLatency,
    CreateThroughput,
    ListLatency,
    WatchFanout,
}

/// Which backend variant drives the collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Dynamic,
    Typed,
}

/// Payload inflation tier applied to the object template
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadTier {
    #[default]
    Baseline,
    /// Pad a body-array field (`spec.payload`)
    LargeBody,
    /// Pad the annotation map (`metadata.annotations`)
    LargeAnnotations,
}

/// Collection addressed by a dynamic benchmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            group: WIDGET_GROUP.to_string(),
            version: WIDGET_VERSION.to_string(),
            resource: WIDGET_RESOURCE.to_string(),
        }
    }
}

/// One benchmark to run. Operation, backend variant, payload tier and cache
/// flag are explicit fields; nothing is inferred from the name, which is
/// used for reporting only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    pub name: String,
    pub operation: OperationKind,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub resource: ResourceSpec,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub payload: PayloadTier,
    /// Kilobytes added by payload inflation
    #[serde(default = "default_payload_kilobytes")]
    pub payload_kilobytes: usize,
    /// Serve lists/watches from the target's bounded-staleness cache
    #[serde(default)]
    pub from_cache: bool,
    /// YAML template file; unset uses the built-in template for the backend
    #[serde(default)]
    pub template_path: Option<String>,
    /// Sequential repetitions for latency operations
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Rolling sample window capacity
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Concurrent creates in a throughput batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Collection size list benchmarks converge to before sampling
    #[serde(default = "default_list_target")]
    pub list_target: usize,
    /// Concurrent subscriptions in a fan-out run
    #[serde(default = "default_watcher_count")]
    pub watcher_count: usize,
    /// Events each subscription must observe in a fan-out run
    #[serde(default = "default_event_count")]
    pub event_count: usize,
    /// Delete the collection after the benchmark finishes
    #[serde(default)]
    pub cleanup: bool,
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

fn default_request_timeout_seconds() -> u64 {
    600
}

fn default_batch_timeout_seconds() -> u64 {
    600
}

fn default_watch_open_timeout_seconds() -> u64 {
    30
}

fn default_watch_event_timeout_seconds() -> u64 {
    60
}

fn default_metrics_listen_addr() -> String {
    "127.0.0.1:9091".to_string()
}

fn default_namespace() -> String {
    "empty".to_string()
}

fn default_payload_kilobytes() -> usize {
    50
}

fn default_iterations() -> usize {
    100
}

fn default_window_size() -> usize {
    100
}

fn default_batch_size() -> usize {
    100
}

fn default_list_target() -> usize {
    1000
}

fn default_watcher_count() -> usize {
    10
}

fn default_event_count() -> usize {
    100
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig {
                base_url: "http://127.0.0.1:8100".to_string(),
                connect_timeout_seconds: default_connect_timeout_seconds(),
                request_timeout_seconds: default_request_timeout_seconds(),
            },
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
            benchmarks: vec![
                BenchmarkSpec {
                    name: "create-latency-widgets".to_string(),
                    operation: OperationKind::CreateLatency,
                    backend: BackendKind::Dynamic,
                    resource: ResourceSpec::default(),
                    namespace: default_namespace(),
                    payload: PayloadTier::Baseline,
                    payload_kilobytes: default_payload_kilobytes(),
                    from_cache: false,
                    template_path: None,
                    iterations: default_iterations(),
                    window_size: default_window_size(),
                    batch_size: default_batch_size(),
                    list_target: default_list_target(),
                    watcher_count: default_watcher_count(),
                    event_count: default_event_count(),
                    cleanup: false,
                },
                BenchmarkSpec {
                    name: "create-throughput-widgets".to_string(),
                    operation: OperationKind::CreateThroughput,
                    backend: BackendKind::Dynamic,
                    resource: ResourceSpec::default(),
                    namespace: default_namespace(),
                    payload: PayloadTier::Baseline,
                    payload_kilobytes: default_payload_kilobytes(),
                    from_cache: false,
                    template_path: None,
                    iterations: default_iterations(),
                    window_size: default_window_size(),
                    batch_size: default_batch_size(),
                    list_target: default_list_target(),
                    watcher_count: default_watcher_count(),
                    event_count: default_event_count(),
                    cleanup: true,
                },
            ],
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file with environment overrides
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SCALEBEAT"))
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration before any backend is constructed
    pub fn validate(&self) -> Result<(), String> {
        if self.target.base_url.is_empty() {
            return Err("target base_url cannot be empty".to_string());
        }
        if !self.target.base_url.starts_with("http") {
            return Err(format!(
                "target base_url must be an http(s) URL, got {}",
                self.target.base_url
            ));
        }
        if self.benchmarks.is_empty() {
            return Err("at least one benchmark must be configured".to_string());
        }

        for spec in &self.benchmarks {
            if spec.name.is_empty() {
                return Err("benchmark name cannot be empty".to_string());
            }
            if spec.namespace.is_empty() {
                return Err(format!("benchmark {} has an empty namespace", spec.name));
            }
            match spec.operation {
                OperationKind::CreateLatency | OperationKind::ListLatency => {
                    if spec.iterations == 0 {
                        return Err(format!("benchmark {} needs iterations > 0", spec.name));
                    }
                    if spec.window_size == 0 {
                        return Err(format!("benchmark {} needs window_size > 0", spec.name));
                    }
                }
                OperationKind::CreateThroughput => {
                    if spec.batch_size == 0 {
                        return Err(format!("benchmark {} needs batch_size > 0", spec.name));
                    }
                }
                OperationKind::WatchFanout => {
                    if spec.watcher_count == 0 || spec.event_count == 0 {
                        return Err(format!(
                            "benchmark {} needs watcher_count and event_count > 0",
                            spec.name
                        ));
                    }
                }
            }
            if spec.payload != PayloadTier::Baseline && spec.payload_kilobytes == 0 {
                return Err(format!(
                    "benchmark {} inflates its payload but payload_kilobytes is 0",
                    spec.name
                ));
            }
            if spec.backend == BackendKind::Typed && spec.payload == PayloadTier::LargeBody {
                // the compiled-in kind has no body-array field to pad
                return Err(format!(
                    "benchmark {} cannot combine the typed backend with a large_body payload",
                    spec.name
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_benchmarks_rejected() {
        let mut config = HarnessConfig::default();
        config.benchmarks.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_typed_large_body_rejected() {
        let mut config = HarnessConfig::default();
        config.benchmarks[0].backend = BackendKind::Typed;
        config.benchmarks[0].payload = PayloadTier::LargeBody;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = HarnessConfig::default();
        config.benchmarks[0].window_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_loading_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[target]
base_url = "http://127.0.0.1:8100"

[[benchmarks]]
name = "watch-fanout"
operation = "watch_fanout"
namespace = "empty"
watcher_count = 4
event_count = 8
"#
        )
        .unwrap();

        let config = HarnessConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.benchmarks.len(), 1);
        let spec = &config.benchmarks[0];
        assert_eq!(spec.operation, OperationKind::WatchFanout);
        assert_eq!(spec.backend, BackendKind::Dynamic);
        assert_eq!(spec.watcher_count, 4);
        assert_eq!(spec.event_count, 8);
        // unset knobs fall back to defaults
        assert_eq!(spec.batch_size, 100);
        assert!(config.validate().is_ok());
    }
}
