//! Watch fan-out measurement: many concurrent subscriptions on one
//! collection while writes are happening, timed until every subscription
//! has drained its event quota.

use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::backend::ResourceBackend;
use crate::error::{HarnessError, Result};
use crate::population::run_concurrent_creates;

/// Result of one fan-out run
#[derive(Debug, Clone, Serialize)]
pub struct WatchFanoutSummary {
    pub watcher_count: usize,
    pub event_count: usize,
    pub events_observed: usize,
    pub elapsed_ms: f64,
    pub events_per_sec: f64,
}

/// Deadlines for the blocking points of a fan-out run. A stalled stream
/// produces a reported timeout instead of hanging the batch.
#[derive(Debug, Clone, Copy)]
pub struct WatchDeadlines {
    /// Time allowed for every subscription to confirm open
    pub open: Duration,
    /// Time allowed for each single event to arrive on a subscription
    pub event: Duration,
}

/// Opens W concurrent subscriptions, waits for all of them to confirm open,
/// then drives E unthrottled concurrent creates while each watcher consumes
/// exactly E events from its own subscription before closing it.
#[derive(Debug, Clone, Copy)]
pub struct WatchFanoutTester {
    watcher_count: usize,
    event_count: usize,
    deadlines: WatchDeadlines,
    create_concurrency: Option<usize>,
}

impl WatchFanoutTester {
    pub fn new(
        watcher_count: usize,
        event_count: usize,
        deadlines: WatchDeadlines,
        create_concurrency: Option<usize>,
    ) -> Self {
        Self {
            watcher_count,
            event_count,
            deadlines,
            create_concurrency,
        }
    }

    /// Returns only after every watcher has drained its quota and closed its
    /// subscription. Any watcher error, create error, or missed deadline
    /// fails the whole run.
    pub async fn run(&self, backend: &ResourceBackend) -> Result<WatchFanoutSummary> {
        let (ready_tx, mut ready_rx) = mpsc::channel::<Result<()>>(self.watcher_count.max(1));
        let (go_tx, go_rx) = watch::channel(false);

        let mut watchers: JoinSet<Result<usize>> = JoinSet::new();
        for watcher in 0..self.watcher_count {
            let backend = backend.clone();
            let ready = ready_tx.clone();
            let mut go = go_rx.clone();
            let quota = self.event_count;
            let event_deadline = self.deadlines.event;
            watchers.spawn(async move {
                let mut subscription = match backend.watch().await {
                    Ok(subscription) => {
                        let _ = ready.send(Ok(())).await;
                        subscription
                    }
                    Err(e) => {
                        let message = format!("watcher {watcher} failed to open subscription: {e}");
                        let _ = ready
                            .send(Err(HarnessError::Measurement(message.clone())))
                            .await;
                        return Err(HarnessError::Measurement(message));
                    }
                };

                // no writes are issued before every watcher reaches this point
                go.wait_for(|started| *started).await.map_err(|_| {
                    HarnessError::Worker("fan-out driver went away before start".to_string())
                })?;

                let mut observed = 0;
                while observed < quota {
                    let event = timeout(event_deadline, subscription.next_event())
                        .await
                        .map_err(|_| {
                            HarnessError::Timeout(format!(
                                "watcher {watcher} waited {}s for event {} of {quota}",
                                event_deadline.as_secs(),
                                observed + 1
                            ))
                        })??;
                    match event {
                        Some(_) => observed += 1,
                        None => {
                            return Err(HarnessError::Measurement(format!(
                                "watcher {watcher} subscription closed after {observed} of {quota} events"
                            )))
                        }
                    }
                }
                // dropping the subscription here closes it
                Ok(observed)
            });
        }
        drop(ready_tx);

        // readiness barrier: one confirmation per watcher before any write
        for _ in 0..self.watcher_count {
            let signal = match timeout(self.deadlines.open, ready_rx.recv()).await {
                Ok(signal) => signal,
                Err(_) => {
                    watchers.abort_all();
                    return Err(HarnessError::Timeout(format!(
                        "subscriptions not all open within {}s",
                        self.deadlines.open.as_secs()
                    )));
                }
            };
            match signal {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    watchers.abort_all();
                    return Err(e);
                }
                None => {
                    watchers.abort_all();
                    return Err(HarnessError::Worker(
                        "watcher exited before reporting readiness".to_string(),
                    ));
                }
            }
        }
        debug!(watchers = self.watcher_count, "all subscriptions open");

        let start = Instant::now();
        let _ = go_tx.send(true);

        if let Err(e) =
            run_concurrent_creates(backend, self.event_count, self.create_concurrency).await
        {
            watchers.abort_all();
            return Err(HarnessError::Measurement(format!(
                "create during fan-out failed: {e}"
            )));
        }

        let mut events_observed = 0;
        while let Some(joined) = watchers.join_next().await {
            match joined {
                Ok(Ok(observed)) => events_observed += observed,
                Ok(Err(e)) => {
                    watchers.abort_all();
                    return Err(e);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    watchers.abort_all();
                    return Err(HarnessError::Worker(e.to_string()));
                }
            }
        }
        let elapsed = start.elapsed();

        let events_per_sec = events_observed as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        info!(
            watchers = self.watcher_count,
            events_per_watcher = self.event_count,
            events_observed,
            elapsed_ms = elapsed.as_millis() as u64,
            "watch fan-out drained"
        );
        Ok(WatchFanoutSummary {
            watcher_count: self.watcher_count,
            event_count: self.event_count,
            events_observed,
            elapsed_ms: elapsed.as_secs_f64() * 1e3,
            events_per_sec,
        })
    }
}
