//! Agent provider registry.
//!
//! Maps a logical agent type and a target compute-cluster type to a provider
//! able to classify the agent (source, sink, processor) and contribute
//! runtime metadata. Providers declare capability sets; a lookup matches
//! both dimensions.
//!
//! The registry is an explicit object built once at startup and passed to the
//! plan compiler by reference.

mod providers;

pub use providers::{ConnectAgentsProvider, GenAiToolkitAgentsProvider, PythonAgentsProvider};

use std::sync::Arc;

use tracing::debug;

use crate::model::{AgentConfiguration, ConfigMap};
use crate::plan::ComponentType;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur during provider lookup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No provider found for agent type '{agent_type}' on cluster type '{cluster_type}'")]
    NoProviderFound {
        agent_type: String,
        cluster_type: String,
    },

    #[error("Provider '{provider}' cannot classify agent type '{agent_type}'")]
    UnclassifiedAgent {
        provider: String,
        agent_type: String,
    },
}

/// Produces runtime metadata for a family of agent types.
pub trait AgentProvider: Send + Sync {
    /// Provider name, for logs and errors.
    fn name(&self) -> &str;

    /// Logical agent types this provider handles.
    fn supported_types(&self) -> &[&str];

    /// Compute-cluster types this provider is compatible with.
    fn supported_cluster_types(&self) -> &[&str];

    /// Whether this provider handles `agent_type` on `cluster_type`.
    fn supports(&self, agent_type: &str, cluster_type: &str) -> bool {
        self.supported_types().contains(&agent_type)
            && self.supported_cluster_types().contains(&cluster_type)
    }

    /// Classify the agent into its component role.
    fn component_type(&self, agent: &AgentConfiguration) -> Result<ComponentType>;

    /// Configuration handed to the agent at runtime.
    fn agent_configuration(&self, agent: &AgentConfiguration) -> ConfigMap {
        agent.configuration.clone()
    }

    /// Backend-agnostic metadata attached to the runtime configuration.
    fn custom_metadata(&self, _agent: &AgentConfiguration) -> Option<ConfigMap> {
        None
    }
}

/// Registry of agent providers.
#[derive(Default, Clone)]
pub struct AgentProviderRegistry {
    providers: Vec<Arc<dyn AgentProvider>>,
}

impl AgentProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ConnectAgentsProvider));
        registry.register(Arc::new(PythonAgentsProvider));
        registry.register(Arc::new(GenAiToolkitAgentsProvider));
        registry
    }

    /// Register a provider. Earlier registrations win on overlap.
    pub fn register(&mut self, provider: Arc<dyn AgentProvider>) {
        debug!(provider = provider.name(), "Registered agent provider");
        self.providers.push(provider);
    }

    /// Find the provider for an agent type on a compute-cluster type.
    pub fn lookup(&self, agent_type: &str, cluster_type: &str) -> Result<&dyn AgentProvider> {
        self.providers
            .iter()
            .find(|p| p.supports(agent_type, cluster_type))
            .map(|p| p.as_ref())
            .ok_or_else(|| RegistryError::NoProviderFound {
                agent_type: agent_type.to_string(),
                cluster_type: cluster_type.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for AgentProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::KUBERNETES_CLUSTER_TYPE;

    fn agent(agent_type: &str) -> AgentConfiguration {
        AgentConfiguration {
            id: format!("{agent_type}_1"),
            name: None,
            agent_type: agent_type.to_string(),
            configuration: ConfigMap::new(),
            input: None,
            output: None,
            resources: Default::default(),
        }
    }

    struct NoopProvider;

    impl AgentProvider for NoopProvider {
        fn name(&self) -> &str {
            "noop"
        }
        fn supported_types(&self) -> &[&str] {
            &["sink"]
        }
        fn supported_cluster_types(&self) -> &[&str] {
            &["none"]
        }
        fn component_type(&self, _agent: &AgentConfiguration) -> Result<ComponentType> {
            Ok(ComponentType::Sink)
        }
    }

    #[test]
    fn test_lookup_matches_type_and_cluster() {
        let registry = AgentProviderRegistry::with_defaults();
        let provider = registry.lookup("sink", KUBERNETES_CLUSTER_TYPE).unwrap();
        assert_eq!(provider.name(), "connect");
        assert_eq!(
            provider.component_type(&agent("sink")).unwrap(),
            ComponentType::Sink
        );
    }

    #[test]
    fn test_lookup_fails_on_unknown_type() {
        let registry = AgentProviderRegistry::with_defaults();
        let err = registry
            .lookup("teleporter", KUBERNETES_CLUSTER_TYPE)
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::NoProviderFound { .. }));
    }

    #[test]
    fn test_lookup_fails_on_incompatible_cluster() {
        let registry = AgentProviderRegistry::with_defaults();
        let err = registry.lookup("sink", "nomad").err().unwrap();
        assert_eq!(
            err.to_string(),
            "No provider found for agent type 'sink' on cluster type 'nomad'"
        );
    }

    #[test]
    fn test_registered_provider_extends_capabilities() {
        let mut registry = AgentProviderRegistry::with_defaults();
        assert!(registry.lookup("sink", "none").is_err());
        registry.register(Arc::new(NoopProvider));
        assert_eq!(registry.lookup("sink", "none").unwrap().name(), "noop");
        // Earlier registration still wins for kubernetes.
        assert_eq!(
            registry.lookup("sink", KUBERNETES_CLUSTER_TYPE).unwrap().name(),
            "connect"
        );
    }

    #[test]
    fn test_empty_registry() {
        let registry = AgentProviderRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.lookup("sink", KUBERNETES_CLUSTER_TYPE).is_err());
    }
}
