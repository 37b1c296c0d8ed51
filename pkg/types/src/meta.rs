use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// --- Resource kinds ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Pod,
    Deployment,
    Service,
    Container,
    Image,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Pod,
        ResourceKind::Deployment,
        ResourceKind::Service,
        ResourceKind::Container,
        ResourceKind::Image,
    ];

    /// Lowercase plural used in registry keys and URL paths.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "pods",
            ResourceKind::Deployment => "deployments",
            ResourceKind::Service => "services",
            ResourceKind::Container => "containers",
            ResourceKind::Image => "images",
        }
    }

    pub fn from_plural(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.plural() == s)
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            ResourceKind::Pod | ResourceKind::Service => "v1",
            ResourceKind::Deployment => "apps/v1",
            ResourceKind::Container | ResourceKind::Image => "engine/v1",
        }
    }

    /// Images are cluster-scoped; everything else lives in a namespace.
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::Image)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Pod => write!(f, "Pod"),
            ResourceKind::Deployment => write!(f, "Deployment"),
            ResourceKind::Service => write!(f, "Service"),
            ResourceKind::Container => write!(f, "Container"),
            ResourceKind::Image => write!(f, "Image"),
        }
    }
}

// --- Object key ---

/// The `(kind, namespace, name)` triple that uniquely identifies an object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        let namespace = if kind.is_namespaced() { namespace } else { "" };
        Self {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        }
    }
}

// --- Owner reference ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: ResourceKind,
    pub name: String,
    pub uid: String,
}

// --- Object metadata ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Assigned by the control plane on create; immutable afterwards.
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Starts at 1 and grows by one on every successful update.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    pub fn named(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner_references.iter().any(|o| o.uid == uid)
    }

    /// Assign server-owned identity fields on admission.
    pub fn stamp(&mut self, uid: String, now: DateTime<Utc>) {
        self.uid = uid;
        self.creation_timestamp = Some(now);
        self.resource_version = 1;
    }
}
