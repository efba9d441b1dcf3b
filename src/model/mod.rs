//! Logical application model.
//!
//! The backend-agnostic description of a pipeline application as produced by
//! the model builder: modules own pipelines and topic definitions, pipelines
//! own an ordered list of agent configurations, and the application carries
//! shared resources, secrets and the target instance.
//!
//! All maps are ordered (`BTreeMap`) so that two models built from the same
//! documents serialize to identical bytes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Module id used when a pipeline document does not name one.
pub const DEFAULT_MODULE: &str = "default";

/// Free-form configuration mapping carried by agents, resources and clusters.
pub type ConfigMap = BTreeMap<String, Value>;

/// Root aggregate of the logical model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Application {
    /// Shared resources keyed by resource id.
    pub resources: BTreeMap<String, Resource>,
    /// Modules keyed by module id.
    pub modules: BTreeMap<String, Module>,
    /// Target streaming and compute clusters.
    pub instance: Option<Instance>,
    /// Secrets keyed by secret id.
    #[serde(skip_serializing_if = "Secrets::is_empty")]
    pub secrets: Secrets,
}

impl Application {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a module, creating it on first use.
    pub fn module_mut(&mut self, id: &str) -> &mut Module {
        self.modules
            .entry(id.to_string())
            .or_insert_with(|| Module::new(id))
    }

    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.get(id)
    }

    /// Iterate every agent with its owning module and pipeline, in module,
    /// pipeline and declaration order.
    pub fn agents(&self) -> impl Iterator<Item = (&Module, &Pipeline, &AgentConfiguration)> {
        self.modules.values().flat_map(|module| {
            module.pipelines.values().flat_map(move |pipeline| {
                pipeline
                    .agents
                    .iter()
                    .map(move |agent| (module, pipeline, agent))
            })
        })
    }

    /// Copy of this application with secrets removed.
    pub fn without_secrets(&self) -> Self {
        Self {
            secrets: Secrets::default(),
            ..self.clone()
        }
    }
}

/// Named grouping of pipelines and topics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Module {
    pub id: String,
    pub pipelines: BTreeMap<String, Pipeline>,
    pub topics: BTreeMap<String, TopicDefinition>,
}

impl Module {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn resolve_topic(&self, name: &str) -> Option<&TopicDefinition> {
        self.topics.get(name)
    }

    /// Find an agent by id in any pipeline of this module.
    pub fn agent(&self, id: &str) -> Option<&AgentConfiguration> {
        self.pipelines.values().find_map(|p| p.agent(id))
    }
}

/// Ordered sequence of agents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pipeline {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub agents: Vec<AgentConfiguration>,
}

impl Pipeline {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
            agents: Vec::new(),
        }
    }

    pub fn agent(&self, id: &str) -> Option<&AgentConfiguration> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn agent_mut(&mut self, id: &str) -> Option<&mut AgentConfiguration> {
        self.agents.iter_mut().find(|a| a.id == id)
    }
}

/// How a topic is provisioned on deploy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreationMode {
    /// List the namespace and create the topic only when absent.
    CreateIfNotExists,
    /// Never create; the topic is managed elsewhere.
    #[default]
    None,
}

impl fmt::Display for CreationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreationMode::CreateIfNotExists => write!(f, "create-if-not-exists"),
            CreationMode::None => write!(f, "none"),
        }
    }
}

/// Schema attached to a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Type tag (avro, json, string, ...).
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Raw schema text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Logical topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDefinition {
    pub name: String,
    #[serde(rename = "creation-mode", default)]
    pub creation_mode: CreationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<u32>,
}

impl TopicDefinition {
    pub fn new(name: impl Into<String>, creation_mode: CreationMode) -> Self {
        Self {
            name: name.into(),
            creation_mode,
            schema: None,
            partitions: None,
        }
    }

    pub fn with_schema(mut self, schema: SchemaDefinition) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Reference held by an agent to where it reads from or writes to.
///
/// Topics are referenced by name and were checked against the module's
/// topic registry when the model was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connection {
    Topic(String),
    Agent(String),
}

/// Sizing of an agent workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesSpec {
    pub parallelism: u32,
    pub size: u32,
}

impl Default for ResourcesSpec {
    fn default() -> Self {
        Self {
            parallelism: 1,
            size: 1,
        }
    }
}

/// One unit of pipeline work as declared in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfiguration {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub agent_type: String,
    #[serde(default)]
    pub configuration: ConfigMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Connection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Connection>,
    #[serde(default)]
    pub resources: ResourcesSpec,
}

/// Shared resource (datasource, AI service, ...) referenced by agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub configuration: ConfigMap,
}

/// One named secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub data: ConfigMap,
}

/// Secrets keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Secrets {
    pub secrets: BTreeMap<String, Secret>,
}

impl Secrets {
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Add or replace a secret by id.
    pub fn put(&mut self, secret: Secret) {
        self.secrets.insert(secret.id.clone(), secret);
    }

    pub fn get(&self, id: &str) -> Option<&Secret> {
        self.secrets.get(id)
    }
}

/// Broker technology the application targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingCluster {
    #[serde(rename = "type")]
    pub cluster_type: String,
    #[serde(default)]
    pub configuration: ConfigMap,
}

impl StreamingCluster {
    pub fn new(cluster_type: impl Into<String>) -> Self {
        Self {
            cluster_type: cluster_type.into(),
            configuration: ConfigMap::new(),
        }
    }

    /// Read a string entry from the configuration.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).and_then(Value::as_str)
    }
}

/// Orchestration platform the agents run on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeCluster {
    #[serde(rename = "type")]
    pub cluster_type: String,
    #[serde(default)]
    pub configuration: ConfigMap,
}

impl Default for ComputeCluster {
    fn default() -> Self {
        Self {
            cluster_type: crate::compute::KUBERNETES_CLUSTER_TYPE.to_string(),
            configuration: ConfigMap::new(),
        }
    }
}

/// Target-instance configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub streaming_cluster: StreamingCluster,
    #[serde(default)]
    pub compute_cluster: ComputeCluster,
}
