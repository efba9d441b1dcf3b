//! Deployer facade.
//!
//! Resolves the runtimes an application targets from its instance document
//! and drives compilation and reconciliation:
//! - `ClusterRuntimeRegistry`: streaming and compute runtimes keyed by type tag
//! - `ApplicationDeployer`: plan, deploy and delete entry points

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::agents::AgentProviderRegistry;
use crate::compute::{
    ClusterClient, ComputeClusterRuntime, ComputeError, KubernetesClusterRuntime,
    KubernetesRuntimeConfig,
};
use crate::model::Application;
use crate::plan::{self, ExecutionPlan, PlanError};
use crate::streaming::{PulsarStreamingClusterRuntime, StreamingClusterRuntime, StreamingError};

/// Result type for deployer operations.
pub type Result<T> = std::result::Result<T, DeployError>;

/// Errors surfaced by the deployer facade.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("No streaming runtime registered for cluster type '{0}'")]
    UnknownStreamingCluster(String),

    #[error("No compute runtime registered for cluster type '{0}'")]
    UnknownComputeCluster(String),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamingError),
}

/// Runtimes available to the deployer, keyed by cluster type tag.
#[derive(Default, Clone)]
pub struct ClusterRuntimeRegistry {
    streaming: BTreeMap<String, Arc<dyn StreamingClusterRuntime>>,
    compute: BTreeMap<String, Arc<dyn ComputeClusterRuntime>>,
}

impl ClusterRuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in brokers and the Kubernetes runtime on
    /// `client`.
    pub fn with_defaults(client: Arc<dyn ClusterClient>, config: KubernetesRuntimeConfig) -> Self {
        let mut registry = Self::new();
        registry.register_streaming(Arc::new(PulsarStreamingClusterRuntime::new()));
        #[cfg(feature = "kafka")]
        registry.register_streaming(Arc::new(crate::streaming::KafkaStreamingClusterRuntime::new()));
        registry.register_compute(Arc::new(KubernetesClusterRuntime::new(client, config)));
        registry
    }

    /// Register a streaming runtime under its own type tag, replacing any
    /// previous one.
    pub fn register_streaming(&mut self, runtime: Arc<dyn StreamingClusterRuntime>) {
        info!(cluster_type = runtime.cluster_type(), "Registered streaming runtime");
        self.streaming
            .insert(runtime.cluster_type().to_string(), runtime);
    }

    /// Register a compute runtime under its own type tag, replacing any
    /// previous one.
    pub fn register_compute(&mut self, runtime: Arc<dyn ComputeClusterRuntime>) {
        info!(cluster_type = runtime.cluster_type(), "Registered compute runtime");
        self.compute.insert(runtime.cluster_type().to_string(), runtime);
    }

    pub fn streaming(&self, cluster_type: &str) -> Result<Arc<dyn StreamingClusterRuntime>> {
        self.streaming
            .get(cluster_type)
            .cloned()
            .ok_or_else(|| DeployError::UnknownStreamingCluster(cluster_type.to_string()))
    }

    pub fn compute(&self, cluster_type: &str) -> Result<Arc<dyn ComputeClusterRuntime>> {
        self.compute
            .get(cluster_type)
            .cloned()
            .ok_or_else(|| DeployError::UnknownComputeCluster(cluster_type.to_string()))
    }

    pub fn streaming_types(&self) -> Vec<&str> {
        self.streaming.keys().map(String::as_str).collect()
    }

    pub fn compute_types(&self) -> Vec<&str> {
        self.compute.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ClusterRuntimeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRuntimeRegistry")
            .field("streaming", &self.streaming_types())
            .field("compute", &self.compute_types())
            .finish()
    }
}

/// Entry point tying compilation to the runtimes.
#[derive(Debug, Clone)]
pub struct ApplicationDeployer {
    runtimes: ClusterRuntimeRegistry,
    agents: AgentProviderRegistry,
}

impl ApplicationDeployer {
    pub fn new(runtimes: ClusterRuntimeRegistry, agents: AgentProviderRegistry) -> Self {
        Self { runtimes, agents }
    }

    pub fn runtimes(&self) -> &ClusterRuntimeRegistry {
        &self.runtimes
    }

    fn streaming_for(&self, plan: &ExecutionPlan) -> Result<Arc<dyn StreamingClusterRuntime>> {
        let cluster = plan
            .streaming_cluster()
            .ok_or(StreamingError::MissingStreamingCluster)?;
        self.runtimes.streaming(&cluster.cluster_type)
    }

    fn compute_for(&self, plan: &ExecutionPlan) -> Result<Arc<dyn ComputeClusterRuntime>> {
        let cluster_type = plan
            .compute_cluster_type()
            .ok_or(PlanError::MissingInstance)?;
        self.runtimes.compute(cluster_type)
    }

    /// Compile `application` against the streaming runtime its instance
    /// names.
    pub fn create_execution_plan(
        &self,
        application_id: &str,
        application: &Application,
    ) -> Result<ExecutionPlan> {
        let instance = application
            .instance
            .as_ref()
            .ok_or(PlanError::MissingInstance)?;
        let streaming = self
            .runtimes
            .streaming(&instance.streaming_cluster.cluster_type)?;
        Ok(plan::compile(
            application_id,
            application,
            streaming.as_ref(),
            &self.agents,
        )?)
    }

    /// Provision topics and agents of `plan` for `tenant`.
    pub async fn deploy(
        &self,
        tenant: &str,
        plan: &ExecutionPlan,
        code_archive_id: Option<&str>,
    ) -> Result<()> {
        let streaming = self.streaming_for(plan)?;
        let compute = self.compute_for(plan)?;
        compute
            .deploy(tenant, plan, streaming.as_ref(), code_archive_id)
            .await?;
        info!(
            tenant = %tenant,
            application_id = %plan.application_id,
            "Deployed application"
        );
        Ok(())
    }

    /// Remove agents, then topics, of `plan` for `tenant`.
    pub async fn delete(&self, tenant: &str, plan: &ExecutionPlan) -> Result<()> {
        let streaming = self.streaming_for(plan)?;
        let compute = self.compute_for(plan)?;
        compute.delete(tenant, plan).await?;
        streaming.delete(plan).await?;
        info!(
            tenant = %tenant,
            application_id = %plan.application_id,
            "Deleted application"
        );
        Ok(())
    }
}
