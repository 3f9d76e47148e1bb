//! Backend-agnostic resource clients. Two variants drive the same operation
//! set against one collection: the dynamic variant addresses arbitrary kinds
//! through a generic document representation, the typed variant is compiled
//! against the fixed `EndpointSet` kind. The harness never mixes variants
//! within one run.

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::config::TargetConfig;
use crate::error::{HarnessError, Result};
use crate::resource::{
    unique_name, EndpointSet, EndpointSetList, ListFilter, ResourceIdentity, ResourceList,
    WatchEvent,
};

/// Capability set over one concrete resource collection. Selected by explicit
/// configuration, constructed once per benchmark run, stateless afterwards
/// apart from the wrapped connection pool.
#[derive(Debug, Clone)]
pub enum ResourceBackend {
    Dynamic(DynamicBackend),
    Typed(TypedBackend),
}

impl ResourceBackend {
    /// Build the dynamic variant for an arbitrary collection
    pub fn dynamic(
        target: &TargetConfig,
        identity: ResourceIdentity,
        template: Value,
        filter: ListFilter,
    ) -> Result<Self> {
        Ok(Self::Dynamic(DynamicBackend {
            http: ApiClient::connect(target)?,
            identity,
            template,
            filter,
        }))
    }

    /// Build the typed variant for the compiled-in kind
    pub fn typed(
        target: &TargetConfig,
        namespace: &str,
        template: EndpointSet,
        filter: ListFilter,
    ) -> Result<Self> {
        Ok(Self::Typed(TypedBackend {
            http: ApiClient::connect(target)?,
            identity: EndpointSet::identity(namespace),
            template,
            filter,
        }))
    }

    pub fn identity(&self) -> &ResourceIdentity {
        match self {
            Self::Dynamic(backend) => &backend.identity,
            Self::Typed(backend) => &backend.identity,
        }
    }

    /// Deep-copies the owned template, assigns a unique generated name from
    /// the current time and `index`, and submits the creation request
    pub async fn create(&self, index: usize) -> Result<Value> {
        match self {
            Self::Dynamic(backend) => backend.create(index).await,
            Self::Typed(backend) => backend.create(index).await,
        }
    }

    /// Lists the collection using the owned filter
    pub async fn list(&self) -> Result<ResourceList> {
        match self {
            Self::Dynamic(backend) => backend.list().await,
            Self::Typed(backend) => backend.list().await,
        }
    }

    /// Authoritative collection size, never served from the cache.
    /// Population bookkeeping only, not a timed operation.
    pub async fn count(&self) -> Result<usize> {
        match self {
            Self::Dynamic(backend) => backend.count().await,
            Self::Typed(backend) => backend.count().await,
        }
    }

    /// Opens a live event subscription using the owned filter. The caller
    /// owns closing it (dropping the subscription closes the stream).
    pub async fn watch(&self) -> Result<WatchSubscription> {
        match self {
            Self::Dynamic(backend) => backend.http.open_watch(&backend.identity, backend.filter).await,
            Self::Typed(backend) => backend.http.open_watch(&backend.identity, backend.filter).await,
        }
    }

    /// Removes every object in the collection. Run-scoped cleanup only,
    /// never interleaved with measurement.
    pub async fn delete_collection(&self) -> Result<u64> {
        match self {
            Self::Dynamic(backend) => backend.http.delete_collection(&backend.identity).await,
            Self::Typed(backend) => backend.http.delete_collection(&backend.identity).await,
        }
    }
}

/// Schema-agnostic client addressing arbitrary resource kinds at runtime
#[derive(Debug, Clone)]
pub struct DynamicBackend {
    http: ApiClient,
    identity: ResourceIdentity,
    template: Value,
    filter: ListFilter,
}

impl DynamicBackend {
    async fn create(&self, index: usize) -> Result<Value> {
        let mut object = self.template.clone();
        set_name(&mut object, unique_name(index))?;
        self.http.create_object(&self.identity, &object).await
    }

    async fn list(&self) -> Result<ResourceList> {
        let response = self.http.list(&self.identity, self.filter).await?;
        Ok(response.json().await?)
    }

    async fn count(&self) -> Result<usize> {
        let response = self.http.list(&self.identity, ListFilter::default()).await?;
        let list: ResourceList = response.json().await?;
        Ok(list.items.len())
    }
}

/// Client compiled against the fixed `EndpointSet` kind: a narrower but
/// statically-checked surface over the same wire contract
#[derive(Debug, Clone)]
pub struct TypedBackend {
    http: ApiClient,
    identity: ResourceIdentity,
    template: EndpointSet,
    filter: ListFilter,
}

impl TypedBackend {
    async fn create(&self, index: usize) -> Result<Value> {
        let mut object = self.template.clone();
        object.metadata.name = unique_name(index);
        let body = serde_json::to_value(&object)?;
        self.http.create_object(&self.identity, &body).await
    }

    async fn list(&self) -> Result<ResourceList> {
        let response = self.http.list(&self.identity, self.filter).await?;
        let list: EndpointSetList = response.json().await?;
        let items = list
            .items
            .into_iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<Value>, _>>()?;
        Ok(ResourceList { items })
    }

    async fn count(&self) -> Result<usize> {
        let response = self.http.list(&self.identity, ListFilter::default()).await?;
        let list: EndpointSetList = response.json().await?;
        Ok(list.items.len())
    }
}

/// Thin HTTP client wrapper shared by both variants, so they surface
/// identical error semantics
#[derive(Debug, Clone)]
struct ApiClient {
    http: Client,
    base_url: String,
    request_timeout: Duration,
}

impl ApiClient {
    fn connect(target: &TargetConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(target.connect_timeout())
            .build()
            .map_err(|e| HarnessError::Setup(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: target.base_url.trim_end_matches('/').to_string(),
            request_timeout: target.request_timeout(),
        })
    }

    fn collection_url(&self, identity: &ResourceIdentity) -> String {
        format!("{}{}", self.base_url, identity.collection_path())
    }

    async fn create_object(&self, identity: &ResourceIdentity, object: &Value) -> Result<Value> {
        let response = self
            .http
            .post(self.collection_url(identity))
            .json(object)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn list(
        &self,
        identity: &ResourceIdentity,
        filter: ListFilter,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .get(self.collection_url(identity))
            .timeout(self.request_timeout);
        if filter.from_cache {
            request = request.query(&[("cache", "true")]);
        }
        check_status(request.send().await?).await
    }

    async fn open_watch(
        &self,
        identity: &ResourceIdentity,
        filter: ListFilter,
    ) -> Result<WatchSubscription> {
        // no total request timeout here: the subscription stays open until
        // the consumer closes it, and per-event deadlines live with the
        // consumer
        let mut request = self
            .http
            .get(self.collection_url(identity))
            .query(&[("watch", "true")]);
        if filter.from_cache {
            request = request.query(&[("cache", "true")]);
        }
        let response = check_status(request.send().await?).await?;
        debug!(collection = %identity.collection_path(), "watch subscription open");

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            .boxed();
        Ok(WatchSubscription {
            lines: FramedRead::new(StreamReader::new(stream), LinesCodec::new()),
        })
    }

    async fn delete_collection(&self, identity: &ResourceIdentity) -> Result<u64> {
        let response = self
            .http
            .delete(self.collection_url(identity))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: DeleteCollectionResponse = response.json().await?;
        Ok(body.deleted)
    }
}

#[derive(Debug, Deserialize)]
struct DeleteCollectionResponse {
    deleted: u64,
}

/// Non-success statuses surface as API errors with the response body attached
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HarnessError::Api {
        status: status.as_u16(),
        body,
    })
}

type WatchByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// One live event subscription, consumed strictly in delivery order.
/// Dropping the subscription closes it.
pub struct WatchSubscription {
    lines: FramedRead<StreamReader<WatchByteStream, Bytes>, LinesCodec>,
}

impl WatchSubscription {
    /// Next event on this subscription, or `None` once the stream ends.
    /// Blocks until an event arrives; callers needing a deadline wrap this
    /// in a timeout.
    pub async fn next_event(&mut self) -> Result<Option<WatchEvent>> {
        loop {
            match self.lines.next().await {
                None => return Ok(None),
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let event: WatchEvent = serde_json::from_str(&line)?;
                    return Ok(Some(event));
                }
                Some(Err(LinesCodecError::Io(e))) => return Err(e.into()),
                Some(Err(other)) => {
                    return Err(HarnessError::Serialization(other.to_string()));
                }
            }
        }
    }
}

/// Writes the generated name into a generic object document
fn set_name(object: &mut Value, name: String) -> Result<()> {
    let root = object.as_object_mut().ok_or_else(|| {
        HarnessError::Serialization("object template is not a mapping".to_string())
    })?;
    let metadata = root
        .entry("metadata".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let metadata = metadata.as_object_mut().ok_or_else(|| {
        HarnessError::Serialization("object template metadata is not a mapping".to_string())
    })?;
    metadata.insert("name".to_string(), Value::String(name));
    Ok(())
}
