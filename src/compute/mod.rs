//! Compute cluster runtimes.
//!
//! This module contains:
//! - `ComputeClusterRuntime` trait: renders plan agents into deployable units
//!   and reconciles them onto an orchestration platform under tenant isolation
//! - `ClusterClient` trait: the control-plane seam (server-side apply, get,
//!   list, delete, namespaces)
//! - Implementations: Kubernetes runtime, kube-rs client (feature `k8s`),
//!   in-memory control plane for tests

use async_trait::async_trait;

use crate::plan::ExecutionPlan;
use crate::streaming::{StreamingClusterRuntime, StreamingError};

mod cluster;
pub mod kubernetes;
pub mod mock;

pub use cluster::{ClusterClient, ClusterError, ClusterResource, OwnerReference, ResourceKind};
pub use kubernetes::{KubernetesClusterRuntime, KubernetesRuntimeConfig};
pub use mock::InMemoryCluster;

#[cfg(feature = "k8s")]
pub use kubernetes::KubeClusterClient;

/// Compute-cluster type tag for Kubernetes.
pub const KUBERNETES_CLUSTER_TYPE: &str = "kubernetes";

/// Result type for compute operations.
pub type Result<T> = std::result::Result<T, ComputeError>;

/// Errors raised by compute runtimes.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("Application {0} is marked for deletion. Please retry once the application is deleted.")]
    ApplicationMarkedForDeletion(String),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamingError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One implementation per orchestration platform.
#[async_trait]
pub trait ComputeClusterRuntime: Send + Sync {
    /// Compute-cluster type tag this runtime serves.
    fn cluster_type(&self) -> &str;

    /// Provision the plan's topics, then create or update every agent's
    /// configuration secret and workload resource in the tenant namespace.
    async fn deploy(
        &self,
        tenant: &str,
        plan: &ExecutionPlan,
        streaming: &dyn StreamingClusterRuntime,
        code_archive_id: Option<&str>,
    ) -> Result<()>;

    /// Delete every agent's workload resource and configuration secret.
    async fn delete(&self, tenant: &str, plan: &ExecutionPlan) -> Result<()>;

    /// Provision the tenant's namespace.
    async fn on_tenant_created(&self, tenant: &str) -> Result<()>;

    /// Mark the tenant's namespace for deletion. Does not wait for it.
    async fn on_tenant_deleted(&self, tenant: &str) -> Result<()>;
}
