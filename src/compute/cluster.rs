//! Control-plane client seam.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

/// Result type for control-plane operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors raised by a control-plane client.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Namespace {0} not found")]
    NamespaceNotFound(String),

    #[error("Namespace {0} is being terminated")]
    NamespaceTerminating(String),

    #[error("Control plane request failed: {0}")]
    Api(String),

    #[cfg(feature = "k8s")]
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Kinds of namespaced resources the runtimes manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// Confidential configuration payload.
    Secret,
    /// Per-agent workload custom resource.
    Agent,
    /// Per-application parent custom resource.
    Application,
}

impl ResourceKind {
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceKind::Secret => "Secret",
            ResourceKind::Agent => "Agent",
            ResourceKind::Application => "Application",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Ownership link used for cascading deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    pub controller: bool,
    pub block_owner_deletion: bool,
}

/// Platform-neutral view of a namespaced resource.
///
/// `body` holds everything outside of metadata (`spec`, `data`, `type`).
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterResource {
    pub kind: ResourceKind,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub owner: Option<OwnerReference>,
    pub finalizers: Vec<String>,
    /// Set by the platform once deletion was requested and finalizers are pending.
    pub deletion_requested: bool,
    /// Assigned by the platform.
    pub uid: Option<String>,
    pub body: Value,
}

impl ClusterResource {
    pub fn new(kind: ResourceKind, name: impl Into<String>, body: Value) -> Self {
        Self {
            kind,
            name: name.into(),
            labels: BTreeMap::new(),
            owner: None,
            finalizers: Vec::new(),
            deletion_requested: false,
            uid: None,
            body,
        }
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_owner(mut self, owner: Option<OwnerReference>) -> Self {
        self.owner = owner;
        self
    }

    /// Pointer lookup into the body, e.g. `/spec/tenant`.
    pub fn field(&self, pointer: &str) -> Option<&Value> {
        self.body.pointer(pointer)
    }

    /// Entry of a secret's `data` map.
    pub fn secret_data(&self, key: &str) -> Option<&str> {
        self.body
            .get("data")
            .and_then(|d| d.get(key))
            .and_then(Value::as_str)
    }
}

/// Namespaced control-plane operations.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create or update a resource with server-side apply semantics.
    ///
    /// Fields not carried by `resource` are preserved. Returns the stored
    /// resource, including its platform-assigned uid.
    async fn apply(&self, namespace: &str, resource: &ClusterResource) -> Result<ClusterResource>;

    async fn get(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ClusterResource>>;

    async fn list(&self, namespace: &str, kind: ResourceKind) -> Result<Vec<ClusterResource>>;

    /// Request deletion. Returns `false` when the resource did not exist.
    async fn delete(&self, namespace: &str, kind: ResourceKind, name: &str) -> Result<bool>;

    /// Create a namespace if it does not exist.
    async fn create_namespace(&self, namespace: &str) -> Result<()>;

    /// Request namespace deletion. The platform removes its content
    /// asynchronously.
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;
}
