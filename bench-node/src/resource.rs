use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// API group of the default custom resource driven by the dynamic backend
pub const WIDGET_GROUP: &str = "bench.scalebeat.dev";
/// API version of the default custom resource
pub const WIDGET_VERSION: &str = "v1";
/// Collection name of the default custom resource
pub const WIDGET_RESOURCE: &str = "widgets";

/// Minimal template for the default custom resource
pub const WIDGET_TEMPLATE: &str = r#"apiVersion: bench.scalebeat.dev/v1
kind: Widget
metadata:
  name: template
"#;

/// Minimal template for the compiled-in typed resource
pub const ENDPOINT_SET_TEMPLATE: &str = r#"apiVersion: v1
kind: EndpointSet
metadata:
  name: template
"#;

/// Identity of one resource collection: group, version, resource kind and
/// namespace. Immutable once a backend is constructed with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub group: String,
    pub version: String,
    pub resource: String,
    pub namespace: String,
}

impl ResourceIdentity {
    pub fn namespaced(group: &str, version: &str, resource: &str, namespace: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// Collection path on the target API. Core-group collections live under
    /// `/api`, grouped collections under `/apis`.
    pub fn collection_path(&self) -> String {
        if self.group.is_empty() {
            format!(
                "/api/{}/namespaces/{}/{}",
                self.version, self.namespace, self.resource
            )
        } else {
            format!(
                "/apis/{}/{}/namespaces/{}/{}",
                self.group, self.version, self.namespace, self.resource
            )
        }
    }
}

/// Options applied to list and watch requests issued by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    /// Serve from the target's bounded-staleness read cache instead of the
    /// authoritative store
    #[serde(default)]
    pub from_cache: bool,
}

/// Object name derived from the current time and a caller-supplied index.
/// The index keeps concurrent creators collision-free even when their clocks
/// coincide.
pub fn unique_name(index: usize) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!("{nanos}-{index}")
}

/// Object metadata shared by every resource on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMeta {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Assigned server-side on create
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Assigned server-side on create
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// The one resource kind the typed backend is compiled against
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSet {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<EndpointAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointAddress {
    pub host: String,
    pub port: u16,
}

impl EndpointSet {
    pub const GROUP: &'static str = "";
    pub const VERSION: &'static str = "v1";
    pub const RESOURCE: &'static str = "endpointsets";

    /// Collection identity for the typed kind in the given namespace
    pub fn identity(namespace: &str) -> ResourceIdentity {
        ResourceIdentity::namespaced(Self::GROUP, Self::VERSION, Self::RESOURCE, namespace)
    }
}

/// Generic list response from the target API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(default)]
    pub items: Vec<Value>,
}

/// Typed list response for the compiled-in kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointSetList {
    #[serde(default)]
    pub items: Vec<EndpointSet>,
}

/// Kinds of events delivered on a watch subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
    Error,
}

/// One event on a watch subscription, correlated to an object change.
/// Delivery order is per-subscription only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub kind: WatchEventKind,
    pub object: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_grouped_collection_path() {
        let identity =
            ResourceIdentity::namespaced(WIDGET_GROUP, WIDGET_VERSION, WIDGET_RESOURCE, "empty");
        assert_eq!(
            identity.collection_path(),
            "/apis/bench.scalebeat.dev/v1/namespaces/empty/widgets"
        );
    }

    #[test]
    fn test_core_collection_path() {
        let identity = EndpointSet::identity("large-data");
        assert_eq!(
            identity.collection_path(),
            "/api/v1/namespaces/large-data/endpointsets"
        );
    }

    #[test]
    fn test_unique_names_do_not_collide_across_indices() {
        let names: HashSet<String> = (0..1000).map(unique_name).collect();
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn test_widget_template_parses() {
        let template: Value = serde_yaml::from_str(WIDGET_TEMPLATE).unwrap();
        assert_eq!(template["kind"], "Widget");
        assert_eq!(template["metadata"]["name"], "template");
    }

    #[test]
    fn test_endpoint_set_template_parses_typed() {
        let template: EndpointSet = serde_yaml::from_str(ENDPOINT_SET_TEMPLATE).unwrap();
        assert_eq!(template.kind, "EndpointSet");
        assert_eq!(template.metadata.name, "template");
        assert!(template.addresses.is_empty());
    }

    #[test]
    fn test_watch_event_wire_format() {
        let event: WatchEvent =
            serde_json::from_str(r#"{"type":"ADDED","object":{"kind":"Widget"}}"#).unwrap();
        assert_eq!(event.kind, WatchEventKind::Added);
        assert_eq!(event.object["kind"], "Widget");
    }
}
