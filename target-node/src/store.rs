//! In-memory collection store: authoritative objects per collection, a watch
//! hub fanning events out to subscribers, and a bounded-staleness list cache.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Identifies one collection: group/version/resource scoped to a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionKey {
    pub group: String,
    pub version: String,
    pub resource: String,
    pub namespace: String,
}

/// Kinds of events delivered to watch subscribers (matches bench-node)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
    Error,
}

/// One event on the watch wire (matches bench-node)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub kind: WatchEventKind,
    pub object: Value,
}

/// Outcome of an insert attempt
#[derive(Debug)]
pub enum InsertOutcome {
    Created(Value),
    AlreadyExists,
}

struct ListCache {
    items: Vec<Value>,
    taken: Instant,
}

/// One live collection
pub struct CollectionState {
    objects: DashMap<String, Value>,
    events: broadcast::Sender<WatchEvent>,
    cache: RwLock<Option<ListCache>>,
}

impl CollectionState {
    fn new(event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(16));
        Self {
            objects: DashMap::new(),
            events,
            cache: RwLock::new(None),
        }
    }

    /// Inserts an object under its name, stamping server-side fields and
    /// notifying watchers. Duplicate names are rejected, never overwritten.
    pub fn insert(&self, name: String, mut object: Value) -> InsertOutcome {
        use dashmap::mapref::entry::Entry;
        match self.objects.entry(name) {
            Entry::Occupied(_) => InsertOutcome::AlreadyExists,
            Entry::Vacant(slot) => {
                stamp_server_fields(&mut object);
                slot.insert(object.clone());
                let _ = self.events.send(WatchEvent {
                    kind: WatchEventKind::Added,
                    object: object.clone(),
                });
                InsertOutcome::Created(object)
            }
        }
    }

    /// Snapshot straight from the authoritative store
    pub fn list_authoritative(&self) -> Vec<Value> {
        self.objects.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Snapshot no older than `ttl`, rebuilt lazily once stale. Staleness is
    /// the contract: creates landing inside the window are invisible here
    /// while the authoritative list already serves them.
    pub async fn list_cached(&self, ttl: Duration) -> Vec<Value> {
        {
            let cache = self.cache.read().await;
            if let Some(cache) = cache.as_ref() {
                if cache.taken.elapsed() < ttl {
                    return cache.items.clone();
                }
            }
        }
        let items = self.list_authoritative();
        debug!(items = items.len(), "list cache refreshed");
        *self.cache.write().await = Some(ListCache {
            items: items.clone(),
            taken: Instant::now(),
        });
        items
    }

    /// Removes every object, emitting a DELETED event per object
    pub fn clear(&self) -> u64 {
        let names: Vec<String> = self.objects.iter().map(|entry| entry.key().clone()).collect();
        let mut deleted = 0;
        for name in names {
            if let Some((_, object)) = self.objects.remove(&name) {
                deleted += 1;
                let _ = self.events.send(WatchEvent {
                    kind: WatchEventKind::Deleted,
                    object,
                });
            }
        }
        deleted
    }

    /// New subscription on this collection's watch hub; only events sent
    /// after subscribing are delivered
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}

/// uid and creation timestamp are assigned server-side on create
fn stamp_server_fields(object: &mut Value) {
    if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.insert(
            "uid".to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );
        metadata.insert(
            "creationTimestamp".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
    }
}

/// Store-wide settings
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Maximum age of a cached list snapshot
    pub cache_ttl: Duration,
    /// Watch hub buffer per collection; slow subscribers past this lag
    /// receive an ERROR event
    pub event_buffer: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_millis(500),
            event_buffer: 4096,
        }
    }
}

/// All collections served by this node
pub struct ResourceStore {
    collections: DashMap<CollectionKey, Arc<CollectionState>>,
    settings: StoreSettings,
}

impl ResourceStore {
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            collections: DashMap::new(),
            settings,
        }
    }

    /// The collection for `key`, created empty on first touch
    pub fn collection(&self, key: CollectionKey) -> Arc<CollectionState> {
        self.collections
            .entry(key)
            .or_insert_with(|| Arc::new(CollectionState::new(self.settings.event_buffer)))
            .clone()
    }

    pub fn cache_ttl(&self) -> Duration {
        self.settings.cache_ttl
    }
}
