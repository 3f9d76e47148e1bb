//! Final run reporting: structured log lines plus metrics counters, with a
//! JSON-serializable summary per benchmark.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::sampler::LatencyStats;
use crate::throughput::ThroughputSummary;
use crate::watchfan::WatchFanoutSummary;

/// Outcome of one benchmark
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum BenchmarkOutcome {
    CreateLatency { latency: LatencyStats },
    ListLatency { latency: LatencyStats },
    CreateThroughput { throughput: ThroughputSummary },
    WatchFanout { fanout: WatchFanoutSummary },
}

/// Report for one finished benchmark run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub benchmark: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: BenchmarkOutcome,
}

impl RunReport {
    pub fn new(benchmark: &str, started_at: DateTime<Utc>, outcome: BenchmarkOutcome) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            benchmark: benchmark.to_string(),
            started_at,
            finished_at: Utc::now(),
            outcome,
        }
    }
}

/// Register metric descriptions once at startup
pub fn initialize_metrics() {
    describe_counter!(
        "bench_objects_created_total",
        "Total objects created across all benchmarks"
    );
    describe_counter!(
        "bench_operations_sampled_total",
        "Total operations timed by latency samplers"
    );
    describe_counter!(
        "bench_watch_events_observed_total",
        "Total watch events observed across all subscriptions"
    );
    describe_counter!("bench_runs_finished_total", "Total finished benchmark runs");
}

/// Emit one run's numbers to the log and the metrics registry
pub fn report_run(report: &RunReport) {
    counter!("bench_runs_finished_total", 1);
    match &report.outcome {
        BenchmarkOutcome::CreateLatency { latency } | BenchmarkOutcome::ListLatency { latency } => {
            counter!("bench_operations_sampled_total", latency.samples as u64);
            info!(
                benchmark = %report.benchmark,
                run_id = %report.run_id,
                samples = latency.samples,
                mean_ms = latency.mean_ms,
                p50_ms = latency.p50_ms,
                p90_ms = latency.p90_ms,
                p99_ms = latency.p99_ms,
                max_ms = latency.max_ms,
                "latency benchmark finished"
            );
        }
        BenchmarkOutcome::CreateThroughput { throughput } => {
            counter!(
                "bench_objects_created_total",
                throughput.batch_size as u64
            );
            info!(
                benchmark = %report.benchmark,
                run_id = %report.run_id,
                batch_size = throughput.batch_size,
                elapsed_ms = throughput.elapsed_ms,
                writes_per_sec = throughput.writes_per_sec,
                "throughput benchmark finished"
            );
        }
        BenchmarkOutcome::WatchFanout { fanout } => {
            counter!(
                "bench_watch_events_observed_total",
                fanout.events_observed as u64
            );
            info!(
                benchmark = %report.benchmark,
                run_id = %report.run_id,
                watchers = fanout.watcher_count,
                events_per_watcher = fanout.event_count,
                events_observed = fanout.events_observed,
                elapsed_ms = fanout.elapsed_ms,
                events_per_sec = fanout.events_per_sec,
                "watch fan-out benchmark finished"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_with_flattened_outcome() {
        let report = RunReport::new(
            "create-throughput-widgets",
            Utc::now(),
            BenchmarkOutcome::CreateThroughput {
                throughput: ThroughputSummary {
                    batch_size: 100,
                    elapsed_ms: 12.5,
                    writes_per_sec: 8000.0,
                },
            },
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["operation"], "create_throughput");
        assert_eq!(json["throughput"]["batch_size"], 100);
        assert_eq!(json["benchmark"], "create-throughput-widgets");
    }
}
