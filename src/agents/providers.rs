//! Built-in agent providers.

use serde_json::Value;

use super::{AgentProvider, RegistryError, Result};
use crate::compute::KUBERNETES_CLUSTER_TYPE;
use crate::model::{AgentConfiguration, ConfigMap};
use crate::plan::ComponentType;

fn unclassified(provider: &str, agent: &AgentConfiguration) -> RegistryError {
    RegistryError::UnclassifiedAgent {
        provider: provider.to_string(),
        agent_type: agent.agent_type.clone(),
    }
}

/// Connector sources and sinks running on Kubernetes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectAgentsProvider;

impl AgentProvider for ConnectAgentsProvider {
    fn name(&self) -> &str {
        "connect"
    }

    fn supported_types(&self) -> &[&str] {
        &["sink", "source"]
    }

    fn supported_cluster_types(&self) -> &[&str] {
        &[KUBERNETES_CLUSTER_TYPE]
    }

    fn component_type(&self, agent: &AgentConfiguration) -> Result<ComponentType> {
        match agent.agent_type.as_str() {
            "sink" => Ok(ComponentType::Sink),
            "source" => Ok(ComponentType::Source),
            _ => Err(unclassified(self.name(), agent)),
        }
    }
}

/// User code packaged in the application's code archive.
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonAgentsProvider;

impl AgentProvider for PythonAgentsProvider {
    fn name(&self) -> &str {
        "python"
    }

    fn supported_types(&self) -> &[&str] {
        &["python-source", "python-sink", "python-function"]
    }

    fn supported_cluster_types(&self) -> &[&str] {
        &[KUBERNETES_CLUSTER_TYPE]
    }

    fn component_type(&self, agent: &AgentConfiguration) -> Result<ComponentType> {
        match agent.agent_type.as_str() {
            "python-source" => Ok(ComponentType::Source),
            "python-sink" => Ok(ComponentType::Sink),
            "python-function" => Ok(ComponentType::Processor),
            _ => Err(unclassified(self.name(), agent)),
        }
    }

    fn custom_metadata(&self, agent: &AgentConfiguration) -> Option<ConfigMap> {
        let mut metadata = ConfigMap::new();
        metadata.insert("runtime".to_string(), Value::from("python"));
        if let Some(class_name) = agent.configuration.get("className") {
            metadata.insert("className".to_string(), class_name.clone());
        }
        Some(metadata)
    }
}

/// Record transformation steps executed by the built-in toolkit.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenAiToolkitAgentsProvider;

impl GenAiToolkitAgentsProvider {
    const STEP_TYPES: &'static [&'static str] = &[
        "identity",
        "drop-fields",
        "merge-key-value",
        "unwrap-key-value",
        "flatten",
        "compute",
        "drop",
        "query",
        "compute-ai-embeddings",
        "ai-chat-completions",
        "text-extractor",
        "text-splitter",
    ];
}

impl AgentProvider for GenAiToolkitAgentsProvider {
    fn name(&self) -> &str {
        "genai-toolkit"
    }

    fn supported_types(&self) -> &[&str] {
        Self::STEP_TYPES
    }

    fn supported_cluster_types(&self) -> &[&str] {
        &[KUBERNETES_CLUSTER_TYPE]
    }

    fn component_type(&self, agent: &AgentConfiguration) -> Result<ComponentType> {
        if Self::STEP_TYPES.contains(&agent.agent_type.as_str()) {
            Ok(ComponentType::Processor)
        } else {
            Err(unclassified(self.name(), agent))
        }
    }

    fn agent_configuration(&self, agent: &AgentConfiguration) -> ConfigMap {
        // The toolkit runs every step through one entrypoint and picks the
        // step implementation from `type`.
        let mut configuration = agent.configuration.clone();
        configuration.insert("type".to_string(), Value::from(agent.agent_type.clone()));
        configuration
    }
}
