//! Backend factory for interface tests.
//!
//! Wires the deployer and the application store onto the in-memory broker
//! admin and control plane. The streaming runtime under test is selected
//! with `STREAMING_BACKEND` (pulsar by default, or kafka).

use std::env;
use std::sync::Arc;

use pipewright::agents::AgentProviderRegistry;
use pipewright::compute::{InMemoryCluster, KubernetesClusterRuntime, KubernetesRuntimeConfig};
use pipewright::deployer::{ApplicationDeployer, ClusterRuntimeRegistry};
use pipewright::store::KubernetesApplicationStore;
use pipewright::streaming::{
    InMemoryTopicAdmin, KafkaStreamingClusterRuntime, PulsarStreamingClusterRuntime,
    StreamingClusterRuntime,
};

/// Streaming backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingBackend {
    Pulsar,
    Kafka,
}

impl StreamingBackend {
    pub fn from_env() -> Self {
        match env::var("STREAMING_BACKEND")
            .unwrap_or_else(|_| "pulsar".to_string())
            .to_lowercase()
            .as_str()
        {
            "kafka" => StreamingBackend::Kafka,
            _ => StreamingBackend::Pulsar,
        }
    }

    /// Streaming-cluster type tag used in instance documents.
    pub fn name(&self) -> &'static str {
        match self {
            StreamingBackend::Pulsar => "pulsar",
            StreamingBackend::Kafka => "kafka",
        }
    }

    fn runtime(&self, admin: InMemoryTopicAdmin) -> Arc<dyn StreamingClusterRuntime> {
        match self {
            StreamingBackend::Pulsar => {
                Arc::new(PulsarStreamingClusterRuntime::with_connector(Arc::new(admin)))
            }
            StreamingBackend::Kafka => {
                Arc::new(KafkaStreamingClusterRuntime::with_connector(Arc::new(admin)))
            }
        }
    }
}

/// Everything a scenario talks to.
pub struct DeployContext {
    pub cluster: InMemoryCluster,
    pub admin: InMemoryTopicAdmin,
    pub deployer: ApplicationDeployer,
    pub store: KubernetesApplicationStore,
    pub config: KubernetesRuntimeConfig,
}

impl DeployContext {
    pub fn new(backend: StreamingBackend) -> Self {
        let cluster = InMemoryCluster::new();
        let admin = InMemoryTopicAdmin::new();
        let config = KubernetesRuntimeConfig::default();

        let mut runtimes = ClusterRuntimeRegistry::new();
        runtimes.register_streaming(backend.runtime(admin.clone()));
        runtimes.register_compute(Arc::new(KubernetesClusterRuntime::new(
            Arc::new(cluster.clone()),
            config.clone(),
        )));

        Self {
            deployer: ApplicationDeployer::new(runtimes, AgentProviderRegistry::with_defaults()),
            store: KubernetesApplicationStore::new(Arc::new(cluster.clone()), config.clone()),
            cluster,
            admin,
            config,
        }
    }
}
