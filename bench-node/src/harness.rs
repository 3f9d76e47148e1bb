//! Benchmark orchestration: turns one configuration into backends,
//! convergence, measurement, and reports, in order.

use chrono::Utc;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{info, instrument};

use crate::backend::ResourceBackend;
use crate::config::{BackendKind, BenchmarkSpec, HarnessConfig, OperationKind, PayloadTier};
use crate::error::{HarnessError, Result};
use crate::inflate;
use crate::population::PopulationController;
use crate::report::{report_run, BenchmarkOutcome, RunReport};
use crate::resource::{
    EndpointSet, ListFilter, ResourceIdentity, ENDPOINT_SET_TEMPLATE, WIDGET_TEMPLATE,
};
use crate::sampler::{LatencySampler, SampledOperation};
use crate::throughput::ThroughputDriver;
use crate::watchfan::{WatchDeadlines, WatchFanoutTester};

/// Runs every configured benchmark in order and reports each one
#[derive(Debug)]
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    /// Validates the configuration up front; invalid setups never run
    pub fn new(config: HarnessConfig) -> Result<Self> {
        config.validate().map_err(HarnessError::Config)?;
        Ok(Self { config })
    }

    pub async fn run(&self) -> Result<Vec<RunReport>> {
        let mut reports = Vec::with_capacity(self.config.benchmarks.len());
        for spec in &self.config.benchmarks {
            let report = self.run_benchmark(spec).await?;
            report_run(&report);
            reports.push(report);
        }
        Ok(reports)
    }

    #[instrument(skip(self, spec), fields(benchmark = %spec.name))]
    async fn run_benchmark(&self, spec: &BenchmarkSpec) -> Result<RunReport> {
        info!(
            operation = ?spec.operation,
            backend = ?spec.backend,
            namespace = %spec.namespace,
            payload = ?spec.payload,
            from_cache = spec.from_cache,
            "starting benchmark"
        );
        let backend = self.build_backend(spec)?;
        let limits = &self.config.limits;
        let started_at = Utc::now();

        let outcome = match spec.operation {
            OperationKind::CreateLatency => {
                let sampler = LatencySampler::new(spec.iterations, spec.window_size);
                let latency = timeout(
                    limits.batch_timeout(),
                    sampler.run(&backend, SampledOperation::Create),
                )
                .await??;
                BenchmarkOutcome::CreateLatency { latency }
            }
            OperationKind::ListLatency => {
                let controller = PopulationController::new(limits.create_concurrency);
                timeout(
                    limits.batch_timeout(),
                    controller.converge(&backend, spec.list_target),
                )
                .await??;
                let sampler = LatencySampler::new(spec.iterations, spec.window_size);
                let latency = timeout(
                    limits.batch_timeout(),
                    sampler.run(&backend, SampledOperation::List),
                )
                .await??;
                BenchmarkOutcome::ListLatency { latency }
            }
            OperationKind::CreateThroughput => {
                let driver = ThroughputDriver::new(spec.batch_size, limits.create_concurrency);
                let throughput = timeout(limits.batch_timeout(), driver.run(&backend)).await??;
                BenchmarkOutcome::CreateThroughput { throughput }
            }
            OperationKind::WatchFanout => {
                let deadlines = WatchDeadlines {
                    open: limits.watch_open_timeout(),
                    event: limits.watch_event_timeout(),
                };
                let tester = WatchFanoutTester::new(
                    spec.watcher_count,
                    spec.event_count,
                    deadlines,
                    limits.create_concurrency,
                );
                let fanout = timeout(limits.batch_timeout(), tester.run(&backend)).await??;
                BenchmarkOutcome::WatchFanout { fanout }
            }
        };

        if spec.cleanup {
            let deleted = backend.delete_collection().await?;
            info!(deleted, "cleaned up collection after benchmark");
        }

        Ok(RunReport::new(&spec.name, started_at, outcome))
    }

    fn build_backend(&self, spec: &BenchmarkSpec) -> Result<ResourceBackend> {
        let filter = ListFilter {
            from_cache: spec.from_cache,
        };
        match spec.backend {
            BackendKind::Dynamic => {
                let identity = ResourceIdentity::namespaced(
                    &spec.resource.group,
                    &spec.resource.version,
                    &spec.resource.resource,
                    &spec.namespace,
                );
                let template = self.load_template(spec, WIDGET_TEMPLATE)?;
                ResourceBackend::dynamic(&self.config.target, identity, template, filter)
            }
            BackendKind::Typed => {
                // inflation runs on the generic document, then the result is
                // re-checked against the compiled-in schema
                let document = self.load_template(spec, ENDPOINT_SET_TEMPLATE)?;
                let template: EndpointSet = serde_json::from_value(document)?;
                ResourceBackend::typed(&self.config.target, &spec.namespace, template, filter)
            }
        }
    }

    fn load_template(&self, spec: &BenchmarkSpec, default_template: &str) -> Result<Value> {
        let raw = match &spec.template_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                HarnessError::Setup(format!("failed to read template {path}: {e}"))
            })?,
            None => default_template.to_string(),
        };
        let document: Value = serde_yaml::from_str(&raw)?;
        match spec.payload {
            PayloadTier::Baseline => Ok(document),
            PayloadTier::LargeBody => {
                inflate::inflate(&document, spec.payload_kilobytes, &["spec", "payload"])
            }
            PayloadTier::LargeAnnotations => inflate::inflate(
                &document,
                spec.payload_kilobytes,
                &["metadata", "annotations"],
            ),
        }
    }
}
