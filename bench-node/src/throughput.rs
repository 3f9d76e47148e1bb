//! Aggregate completion time for a fixed-size, fully concurrent create batch:
//! a proxy for server-side write throughput under saturating load.

use serde::Serialize;
use std::time::Instant;
use tracing::info;

use crate::backend::ResourceBackend;
use crate::error::{HarnessError, Result};
use crate::population::run_concurrent_creates;

/// Result of one concurrent create batch
#[derive(Debug, Clone, Serialize)]
pub struct ThroughputSummary {
    pub batch_size: usize,
    pub elapsed_ms: f64,
    pub writes_per_sec: f64,
}

/// Fires exactly `batch_size` concurrent creates and times the whole batch
#[derive(Debug, Clone, Copy)]
pub struct ThroughputDriver {
    batch_size: usize,
    create_concurrency: Option<usize>,
}

impl ThroughputDriver {
    pub fn new(batch_size: usize, create_concurrency: Option<usize>) -> Self {
        Self {
            batch_size,
            create_concurrency,
        }
    }

    /// A failure in any one create is fatal for the batch: a partially
    /// succeeded batch does not represent a valid throughput sample.
    pub async fn run(&self, backend: &ResourceBackend) -> Result<ThroughputSummary> {
        let start = Instant::now();
        run_concurrent_creates(backend, self.batch_size, self.create_concurrency)
            .await
            .map_err(|e| HarnessError::Measurement(e.to_string()))?;
        let elapsed = start.elapsed();

        let elapsed_secs = elapsed.as_secs_f64().max(f64::EPSILON);
        let writes_per_sec = self.batch_size as f64 / elapsed_secs;
        info!(
            batch_size = self.batch_size,
            elapsed_ms = elapsed.as_millis() as u64,
            writes_per_sec = writes_per_sec as u64,
            "create batch finished"
        );
        Ok(ThroughputSummary {
            batch_size: self.batch_size,
            elapsed_ms: elapsed.as_secs_f64() * 1e3,
            writes_per_sec,
        })
    }
}
