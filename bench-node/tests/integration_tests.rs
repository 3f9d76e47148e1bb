//! End-to-end tests for the bench node harness
//!
//! Every test spawns a private in-process target node on an ephemeral port
//! and drives it over real HTTP: population convergence, throughput batches,
//! latency sampling, watch fan-out and collection cleanup.

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use bench_node::backend::ResourceBackend;
use bench_node::config::{
    BackendKind, BenchmarkSpec, HarnessConfig, OperationKind, PayloadTier, ResourceSpec,
    TargetConfig,
};
use bench_node::error::HarnessError;
use bench_node::harness::Harness;
use bench_node::population::PopulationController;
use bench_node::report::BenchmarkOutcome;
use bench_node::resource::{
    EndpointSet, ListFilter, ResourceIdentity, WatchEventKind, ENDPOINT_SET_TEMPLATE,
    WIDGET_GROUP, WIDGET_RESOURCE, WIDGET_TEMPLATE, WIDGET_VERSION,
};
use bench_node::sampler::{LatencySampler, SampledOperation};
use bench_node::throughput::ThroughputDriver;
use bench_node::watchfan::{WatchDeadlines, WatchFanoutTester};
use target_node::{AppState, StoreSettings};

/// Spawn a private target node and return its base URL
async fn spawn_target(cache_ttl: Duration) -> Result<String> {
    let state = AppState::new(StoreSettings {
        cache_ttl,
        event_buffer: 4096,
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let local_addr = listener.local_addr()?;
    tokio::spawn(target_node::serve(listener, state));
    Ok(format!("http://{local_addr}"))
}

fn target_config(base_url: &str) -> TargetConfig {
    TargetConfig {
        base_url: base_url.to_string(),
        connect_timeout_seconds: 5,
        request_timeout_seconds: 30,
    }
}

fn widget_backend(base_url: &str, namespace: &str, from_cache: bool) -> Result<ResourceBackend> {
    let template: Value = serde_yaml::from_str(WIDGET_TEMPLATE)?;
    let identity =
        ResourceIdentity::namespaced(WIDGET_GROUP, WIDGET_VERSION, WIDGET_RESOURCE, namespace);
    let backend = ResourceBackend::dynamic(
        &target_config(base_url),
        identity,
        template,
        ListFilter { from_cache },
    )?;
    Ok(backend)
}

fn fanout_deadlines() -> WatchDeadlines {
    WatchDeadlines {
        open: Duration::from_secs(5),
        event: Duration::from_secs(10),
    }
}

#[tokio::test]
async fn test_converge_on_empty_collection_reaches_target() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(500)).await?;
    let backend = widget_backend(&base_url, "converge-empty", false)?;

    PopulationController::new(None).converge(&backend, 100).await?;

    assert_eq!(backend.count().await?, 100);
    Ok(())
}

#[tokio::test]
async fn test_converge_is_a_noop_at_target() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(500)).await?;
    let backend = widget_backend(&base_url, "converge-noop", false)?;
    let controller = PopulationController::new(None);

    controller.converge(&backend, 10).await?;
    controller.converge(&backend, 10).await?;

    assert_eq!(backend.count().await?, 10);
    Ok(())
}

#[tokio::test]
async fn test_converge_fails_on_overfull_collection_without_deleting() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(500)).await?;
    let backend = widget_backend(&base_url, "converge-over", false)?;
    let controller = PopulationController::new(None);

    controller.converge(&backend, 150).await?;
    let result = controller.converge(&backend, 100).await;

    match result {
        Err(HarnessError::Consistency { want, found }) => {
            assert_eq!(want, 100);
            assert_eq!(found, 150);
        }
        other => panic!("expected consistency error, got {other:?}"),
    }
    // nothing was created or removed
    assert_eq!(backend.count().await?, 150);
    Ok(())
}

#[tokio::test]
async fn test_converge_respects_concurrency_cap() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(500)).await?;
    let backend = widget_backend(&base_url, "converge-capped", false)?;

    PopulationController::new(Some(4)).converge(&backend, 25).await?;

    assert_eq!(backend.count().await?, 25);
    Ok(())
}

#[tokio::test]
async fn test_throughput_batch_creates_exactly_batch_size_objects() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(500)).await?;
    let backend = widget_backend(&base_url, "throughput", false)?;

    let summary = ThroughputDriver::new(100, None).run(&backend).await?;

    assert_eq!(summary.batch_size, 100);
    assert!(summary.elapsed_ms > 0.0);
    assert!(summary.writes_per_sec > 0.0);
    // generated names were unique: the target rejects duplicates with 409,
    // which would have failed the batch
    assert_eq!(backend.count().await?, 100);
    Ok(())
}

#[tokio::test]
async fn test_latency_sampler_retains_window_of_most_recent_samples() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(500)).await?;
    let backend = widget_backend(&base_url, "latency-create", false)?;

    let stats = LatencySampler::new(20, 8)
        .run(&backend, SampledOperation::Create)
        .await?;

    assert_eq!(stats.samples, 8);
    assert!(stats.max_ms >= stats.min_ms);
    assert!(stats.mean_ms > 0.0);
    // every iteration created one object even though only 8 were retained
    assert_eq!(backend.count().await?, 20);
    Ok(())
}

#[tokio::test]
async fn test_list_latency_over_converged_collection() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(500)).await?;
    let backend = widget_backend(&base_url, "latency-list", false)?;

    PopulationController::new(None).converge(&backend, 50).await?;
    let stats = LatencySampler::new(10, 10)
        .run(&backend, SampledOperation::List)
        .await?;

    assert_eq!(stats.samples, 10);
    assert_eq!(backend.list().await?.items.len(), 50);
    Ok(())
}

#[tokio::test]
async fn test_cached_list_serves_bounded_staleness_snapshot() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(300)).await?;
    let cached = widget_backend(&base_url, "cached-list", true)?;
    let authoritative = widget_backend(&base_url, "cached-list", false)?;

    PopulationController::new(None).converge(&authoritative, 5).await?;
    assert_eq!(cached.list().await?.items.len(), 5);

    // creates landing inside the staleness window stay invisible to the
    // cached list while the authoritative list already serves them
    PopulationController::new(None).converge(&authoritative, 8).await?;
    assert_eq!(cached.list().await?.items.len(), 5);
    assert_eq!(authoritative.list().await?.items.len(), 8);

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(cached.list().await?.items.len(), 8);
    Ok(())
}

#[tokio::test]
async fn test_watch_fanout_observes_full_quota_on_every_subscription() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(500)).await?;
    let backend = widget_backend(&base_url, "fanout", false)?;

    let summary = WatchFanoutTester::new(10, 5, fanout_deadlines(), None)
        .run(&backend)
        .await?;

    assert_eq!(summary.watcher_count, 10);
    assert_eq!(summary.event_count, 5);
    assert_eq!(summary.events_observed, 50);
    assert!(summary.elapsed_ms > 0.0);
    assert_eq!(backend.count().await?, 5);
    Ok(())
}

#[tokio::test]
async fn test_watch_delivers_created_objects_in_order_of_subscription_stream() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(500)).await?;
    let backend = widget_backend(&base_url, "watch-single", false)?;

    let mut subscription = backend.watch().await?;
    backend.create(0).await?;

    let event = subscription
        .next_event()
        .await?
        .expect("subscription ended before delivering the event");
    assert_eq!(event.kind, WatchEventKind::Added);
    assert!(event.object["metadata"]["uid"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_idle_watch_consume_times_out_instead_of_hanging() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(500)).await?;
    let backend = widget_backend(&base_url, "watch-idle", false)?;

    let mut subscription = backend.watch().await?;
    let result =
        tokio::time::timeout(Duration::from_millis(200), subscription.next_event()).await;

    assert!(result.is_err(), "consume should hit the deadline");
    Ok(())
}

#[tokio::test]
async fn test_delete_collection_removes_every_object() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(500)).await?;
    let backend = widget_backend(&base_url, "cleanup", false)?;

    PopulationController::new(None).converge(&backend, 10).await?;
    let deleted = backend.delete_collection().await?;

    assert_eq!(deleted, 10);
    assert_eq!(backend.count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_typed_backend_round_trips_the_compiled_in_kind() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(500)).await?;
    let template: EndpointSet = serde_yaml::from_str(ENDPOINT_SET_TEMPLATE)?;
    let backend = ResourceBackend::typed(
        &target_config(&base_url),
        "typed",
        template,
        ListFilter::default(),
    )?;

    let created = backend.create(0).await?;
    assert_eq!(created["kind"], "EndpointSet");
    assert!(created["metadata"]["uid"].is_string());

    PopulationController::new(None).converge(&backend, 3).await?;
    assert_eq!(backend.count().await?, 3);

    let list = backend.list().await?;
    assert_eq!(list.items.len(), 3);
    for item in &list.items {
        assert_eq!(item["kind"], "EndpointSet");
    }
    Ok(())
}

#[tokio::test]
async fn test_duplicate_name_is_rejected_on_the_wire() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(500)).await?;
    let url = format!("{base_url}/apis/bench.scalebeat.dev/v1/namespaces/conflict/widgets");
    let client = reqwest::Client::new();
    let object = serde_json::json!({"kind": "Widget", "metadata": {"name": "same"}});

    let first = client.post(&url).json(&object).send().await?;
    assert_eq!(first.status().as_u16(), 201);

    let second = client.post(&url).json(&object).send().await?;
    assert_eq!(second.status().as_u16(), 409);

    let nameless = serde_json::json!({"kind": "Widget", "metadata": {}});
    let third = client.post(&url).json(&nameless).send().await?;
    assert_eq!(third.status().as_u16(), 422);
    Ok(())
}

#[tokio::test]
async fn test_harness_runs_configured_benchmarks_end_to_end() -> Result<()> {
    let base_url = spawn_target(Duration::from_millis(100)).await?;
    let mut config = HarnessConfig {
        target: target_config(&base_url),
        benchmarks: Vec::new(),
        ..HarnessConfig::default()
    };
    config.benchmarks = vec![
        BenchmarkSpec {
            name: "e2e-create-latency".to_string(),
            operation: OperationKind::CreateLatency,
            backend: BackendKind::Dynamic,
            resource: ResourceSpec::default(),
            namespace: "e2e-latency".to_string(),
            payload: PayloadTier::LargeAnnotations,
            payload_kilobytes: 2,
            from_cache: false,
            template_path: None,
            iterations: 6,
            window_size: 4,
            batch_size: 10,
            list_target: 10,
            watcher_count: 2,
            event_count: 2,
            cleanup: true,
        },
        BenchmarkSpec {
            name: "e2e-watch-fanout".to_string(),
            operation: OperationKind::WatchFanout,
            backend: BackendKind::Dynamic,
            resource: ResourceSpec::default(),
            namespace: "e2e-fanout".to_string(),
            payload: PayloadTier::Baseline,
            payload_kilobytes: 2,
            from_cache: false,
            template_path: None,
            iterations: 6,
            window_size: 4,
            batch_size: 10,
            list_target: 10,
            watcher_count: 3,
            event_count: 4,
            cleanup: false,
        },
    ];

    let reports = Harness::new(config)?.run().await?;
    assert_eq!(reports.len(), 2);

    match &reports[0].outcome {
        BenchmarkOutcome::CreateLatency { latency } => {
            // window capacity bounds the retained samples
            assert_eq!(latency.samples, 4);
        }
        other => panic!("expected a latency outcome, got {other:?}"),
    }
    match &reports[1].outcome {
        BenchmarkOutcome::WatchFanout { fanout } => {
            assert_eq!(fanout.events_observed, 12);
        }
        other => panic!("expected a fan-out outcome, got {other:?}"),
    }
    Ok(())
}
