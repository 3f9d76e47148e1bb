//! Drives a live collection to an exact target count before measurement.
//! List and watch benchmarks need a stable, known-size working set.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::backend::ResourceBackend;
use crate::error::{HarnessError, Result};

/// Converges a collection to exactly `target` objects, or fails
#[derive(Debug, Clone, Copy, Default)]
pub struct PopulationController {
    create_concurrency: Option<usize>,
}

impl PopulationController {
    /// `create_concurrency` caps simultaneous in-flight creates; `None`
    /// leaves the backend's own admission control as the only limit.
    pub fn new(create_concurrency: Option<usize>) -> Self {
        Self { create_concurrency }
    }

    /// Creates exactly the deficit needed to reach `target`. A collection
    /// already above target is an unclean environment, not a transient
    /// fault: extras are never deleted and the run fails before issuing any
    /// create. A single failed create aborts the whole convergence, since a
    /// short collection silently invalidates every later measurement.
    pub async fn converge(&self, backend: &ResourceBackend, target: usize) -> Result<()> {
        let count = backend.count().await.map_err(|e| {
            HarnessError::Population(format!("failed to check collection size: {e}"))
        })?;
        if count > target {
            return Err(HarnessError::Consistency {
                want: target,
                found: count,
            });
        }
        let deficit = target - count;
        if deficit == 0 {
            debug!(target, "collection already at target size");
            return Ok(());
        }

        info!(current = count, target, deficit, "converging collection population");
        run_concurrent_creates(backend, deficit, self.create_concurrency)
            .await
            .map_err(|e| HarnessError::Population(e.to_string()))?;
        Ok(())
    }
}

/// Launches `count` concurrent creates, each with a distinct index in
/// `[0, count)`, and waits for all of them. The first failure aborts the
/// remaining in-flight tasks and fails the batch.
pub(crate) async fn run_concurrent_creates(
    backend: &ResourceBackend,
    count: usize,
    concurrency: Option<usize>,
) -> Result<()> {
    let limiter = concurrency.map(|permits| Arc::new(Semaphore::new(permits.max(1))));
    let mut tasks: JoinSet<Result<()>> = JoinSet::new();
    for index in 0..count {
        let backend = backend.clone();
        let limiter = limiter.clone();
        tasks.spawn(async move {
            let _permit = match limiter {
                Some(semaphore) => Some(
                    semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| HarnessError::Worker(e.to_string()))?,
                ),
                None => None,
            };
            backend.create(index).await?;
            Ok(())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tasks.abort_all();
                return Err(e);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                tasks.abort_all();
                return Err(HarnessError::Worker(e.to_string()));
            }
        }
    }
    Ok(())
}
