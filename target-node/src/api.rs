//! HTTP surface of the resource API: create, list, watch and
//! delete-collection over named, versioned, namespaced collections.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures_util::StreamExt;
use metrics::counter;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::store::{CollectionKey, InsertOutcome, ResourceStore, StoreSettings, WatchEvent, WatchEventKind};

/// Shared API state
#[derive(Clone)]
pub struct AppState {
    store: Arc<ResourceStore>,
}

impl AppState {
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            store: Arc::new(ResourceStore::new(settings)),
        }
    }
}

/// Query options on collection GETs
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub watch: bool,
    #[serde(default)]
    pub cache: bool,
}

/// Create the API router with all endpoints
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/apis/:group/:version/namespaces/:namespace/:resource",
            get(list_grouped).post(create_grouped).delete(purge_grouped),
        )
        .route(
            "/api/:version/namespaces/:namespace/:resource",
            get(list_core).post(create_core).delete(purge_core),
        )
        .route("/healthz", get(health_check))
        .with_state(state)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn create_grouped(
    State(state): State<AppState>,
    Path((group, version, namespace, resource)): Path<(String, String, String, String)>,
    Json(object): Json<Value>,
) -> Response {
    create_object(state, grouped_key(group, version, namespace, resource), object)
}

async fn create_core(
    State(state): State<AppState>,
    Path((version, namespace, resource)): Path<(String, String, String)>,
    Json(object): Json<Value>,
) -> Response {
    create_object(state, core_key(version, namespace, resource), object)
}

async fn list_grouped(
    State(state): State<AppState>,
    Path((group, version, namespace, resource)): Path<(String, String, String, String)>,
    Query(params): Query<ListParams>,
) -> Response {
    list_collection(state, grouped_key(group, version, namespace, resource), params).await
}

async fn list_core(
    State(state): State<AppState>,
    Path((version, namespace, resource)): Path<(String, String, String)>,
    Query(params): Query<ListParams>,
) -> Response {
    list_collection(state, core_key(version, namespace, resource), params).await
}

async fn purge_grouped(
    State(state): State<AppState>,
    Path((group, version, namespace, resource)): Path<(String, String, String, String)>,
) -> Response {
    purge_collection(state, grouped_key(group, version, namespace, resource))
}

async fn purge_core(
    State(state): State<AppState>,
    Path((version, namespace, resource)): Path<(String, String, String)>,
) -> Response {
    purge_collection(state, core_key(version, namespace, resource))
}

fn grouped_key(
    group: String,
    version: String,
    namespace: String,
    resource: String,
) -> CollectionKey {
    CollectionKey {
        group,
        version,
        resource,
        namespace,
    }
}

fn core_key(version: String, namespace: String, resource: String) -> CollectionKey {
    CollectionKey {
        group: String::new(),
        version,
        resource,
        namespace,
    }
}

fn create_object(state: AppState, key: CollectionKey, object: Value) -> Response {
    let Some(name) = object
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .map(str::to_owned)
    else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "metadata.name is required"})),
        )
            .into_response();
    };

    let collection = state.store.collection(key);
    match collection.insert(name.clone(), object) {
        InsertOutcome::Created(stored) => {
            counter!("target_objects_created_total", 1);
            (StatusCode::CREATED, Json(stored)).into_response()
        }
        InsertOutcome::AlreadyExists => {
            warn!(name = %name, "create rejected: object already exists");
            (
                StatusCode::CONFLICT,
                Json(json!({"error": format!("object {name} already exists")})),
            )
                .into_response()
        }
    }
}

async fn list_collection(state: AppState, key: CollectionKey, params: ListParams) -> Response {
    let collection = state.store.collection(key);
    if params.watch {
        counter!("target_watch_subscriptions_total", 1);
        return watch_stream(collection.subscribe());
    }

    let items = if params.cache {
        collection.list_cached(state.store.cache_ttl()).await
    } else {
        collection.list_authoritative()
    };
    counter!("target_lists_served_total", 1);
    debug!(items = items.len(), cached = params.cache, "served list");
    Json(json!({ "items": items })).into_response()
}

/// Newline-delimited JSON event stream for one subscription. Subscribers
/// that fall behind the hub buffer get an ERROR event instead of silently
/// missing deliveries.
fn watch_stream(receiver: broadcast::Receiver<WatchEvent>) -> Response {
    let stream = BroadcastStream::new(receiver).map(|delivery| {
        let event = match delivery {
            Ok(event) => event,
            Err(BroadcastStreamRecvError::Lagged(missed)) => WatchEvent {
                kind: WatchEventKind::Error,
                object: json!({"error": format!("subscription lagged, {missed} events dropped")}),
            },
        };
        let line = match serde_json::to_string(&event) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            Err(e) => format!("{{\"type\":\"ERROR\",\"object\":{{\"error\":\"{e}\"}}}}\n"),
        };
        Ok::<Bytes, std::io::Error>(Bytes::from(line))
    });

    (
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(stream),
    )
        .into_response()
}

fn purge_collection(state: AppState, key: CollectionKey) -> Response {
    let collection = state.store.collection(key);
    let deleted = collection.clear();
    counter!("target_collections_purged_total", 1);
    debug!(deleted, "purged collection");
    Json(json!({ "deleted": deleted })).into_response()
}
