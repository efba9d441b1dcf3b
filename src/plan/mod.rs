//! Execution plan compiler.
//!
//! Walks the logical [`Application`] and asks the selected streaming runtime
//! and the agent provider registry for physical counterparts of every topic
//! and agent. Compilation is a pure function of the application and the
//! runtime configuration: no broker or cluster is contacted.
//!
//! Agent-to-agent links produced by pipeline chaining are materialised as
//! topics. When the downstream agent declares an explicit input topic the
//! upstream agent writes to it; otherwise an implicit topic is created for
//! the link.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agents::{AgentProviderRegistry, RegistryError};
use crate::model::{
    AgentConfiguration, Application, ConfigMap, Connection, CreationMode, ResourcesSpec,
    SchemaDefinition, StreamingCluster, TopicDefinition,
};
use crate::streaming::{StreamingClusterRuntime, StreamingError};

/// Result type for plan compilation.
pub type Result<T> = std::result::Result<T, PlanError>;

/// Errors raised while compiling an execution plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Application has no instance (streaming and compute cluster) configured")]
    MissingInstance,

    #[error("Agent '{agent}': type '{agent_type}' is not supported on compute cluster '{cluster_type}'")]
    UnsupportedAgentType {
        agent: String,
        agent_type: String,
        cluster_type: String,
        #[source]
        source: RegistryError,
    },

    #[error("Agent '{agent}' references unknown topic '{topic}'")]
    UnresolvedTopic { agent: String, topic: String },

    #[error("Agent '{agent}' references unknown agent '{target}'")]
    UnresolvedAgent { agent: String, target: String },

    #[error("Agent id '{agent}' is used more than once in the application")]
    DuplicateAgent { agent: String },

    #[error("Topic '{topic}' is declared with conflicting settings in more than one module")]
    ConflictingTopic { topic: String },

    #[error("Topic '{topic}' cannot be mapped to the streaming cluster: {source}")]
    Topic {
        topic: String,
        #[source]
        source: StreamingError,
    },
}

/// Role of an agent in the data flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentType {
    Source,
    Sink,
    Processor,
}

/// Three-part hierarchical topic identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalTopicName {
    pub tenant: String,
    pub namespace: String,
    pub name: String,
}

/// Physical counterpart of a logical topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicImplementation {
    /// Logical name the topic was declared with.
    pub logical_name: String,
    pub name: PhysicalTopicName,
    /// Broker-specific fully-qualified name, used for existence checks.
    pub fully_qualified_name: String,
    pub creation_mode: CreationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<u32>,
    /// Created by the compiler for an agent-to-agent link.
    #[serde(default)]
    pub implicit: bool,
}

/// Physical agent in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentNode {
    pub id: String,
    pub agent_type: String,
    pub component_type: ComponentType,
    pub configuration: ConfigMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<TopicImplementation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<TopicImplementation>,
    pub resources: ResourcesSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_metadata: Option<ConfigMap>,
}

/// Physical, backend-resolved compilation of an application.
///
/// Derived on every deploy and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub application_id: String,
    pub application: Application,
    /// Agents keyed by agent id.
    pub agents: BTreeMap<String, AgentNode>,
    /// Physical topics keyed by fully-qualified name.
    pub topics: BTreeMap<String, TopicImplementation>,
}

impl ExecutionPlan {
    pub fn streaming_cluster(&self) -> Option<&StreamingCluster> {
        self.application
            .instance
            .as_ref()
            .map(|i| &i.streaming_cluster)
    }

    pub fn compute_cluster_type(&self) -> Option<&str> {
        self.application
            .instance
            .as_ref()
            .map(|i| i.compute_cluster.cluster_type.as_str())
    }

    pub fn agent(&self, id: &str) -> Option<&AgentNode> {
        self.agents.get(id)
    }
}

/// Name of the topic materialised for an agent-to-agent link.
pub fn implicit_topic_name(application_id: &str, from: &str, to: &str) -> String {
    format!("{application_id}-{from}-to-{to}")
}

/// Compile an application into an execution plan.
pub fn compile(
    application_id: &str,
    application: &Application,
    streaming: &dyn StreamingClusterRuntime,
    registry: &AgentProviderRegistry,
) -> Result<ExecutionPlan> {
    PlanCompiler {
        application_id,
        application,
        streaming,
        registry,
    }
    .compile()
}

struct PlanCompiler<'a> {
    application_id: &'a str,
    application: &'a Application,
    streaming: &'a dyn StreamingClusterRuntime,
    registry: &'a AgentProviderRegistry,
}

/// Physical topics of one module, keyed by logical name.
type ModuleTopics = BTreeMap<String, TopicImplementation>;

impl PlanCompiler<'_> {
    fn compile(&self) -> Result<ExecutionPlan> {
        let instance = self
            .application
            .instance
            .as_ref()
            .ok_or(PlanError::MissingInstance)?;
        let cluster = &instance.streaming_cluster;
        let cluster_type = instance.compute_cluster.cluster_type.as_str();

        let mut plan = ExecutionPlan {
            application_id: self.application_id.to_string(),
            application: self.application.clone(),
            agents: BTreeMap::new(),
            topics: BTreeMap::new(),
        };

        let mut module_topics: BTreeMap<&str, ModuleTopics> = BTreeMap::new();
        for module in self.application.modules.values() {
            let topics = module_topics.entry(module.id.as_str()).or_default();
            for definition in module.topics.values() {
                let topic = self.map_topic(definition, cluster)?;
                register_topic(&mut plan.topics, &topic)?;
                topics.insert(definition.name.clone(), topic);
            }
        }

        // Agent-to-agent links, keyed by the id of the writing agent and of
        // the reading agent respectively.
        let mut link_outputs: BTreeMap<String, TopicImplementation> = BTreeMap::new();
        let mut link_inputs: BTreeMap<String, TopicImplementation> = BTreeMap::new();
        let mut seen = BTreeSet::new();

        for (module, _, agent) in self.application.agents() {
            if !seen.insert(agent.id.as_str()) {
                return Err(PlanError::DuplicateAgent {
                    agent: agent.id.clone(),
                });
            }
            let Some(Connection::Agent(target_id)) = &agent.output else {
                continue;
            };
            let target = module
                .agent(target_id)
                .ok_or_else(|| PlanError::UnresolvedAgent {
                    agent: agent.id.clone(),
                    target: target_id.clone(),
                })?;
            let topic = match &target.input {
                Some(Connection::Topic(name)) => {
                    lookup_topic(&module_topics[module.id.as_str()], &target.id, name)?.clone()
                }
                _ => {
                    let topic = self.implicit_topic(&agent.id, target_id, cluster)?;
                    register_topic(&mut plan.topics, &topic)?;
                    link_inputs.insert(target_id.clone(), topic.clone());
                    topic
                }
            };
            link_outputs.insert(agent.id.clone(), topic);
        }

        for (module, pipeline, agent) in self.application.agents() {
            let topics = &module_topics[module.id.as_str()];

            let input = match &agent.input {
                Some(Connection::Topic(name)) => {
                    Some(lookup_topic(topics, &agent.id, name)?.clone())
                }
                Some(Connection::Agent(source_id)) => {
                    let source =
                        module
                            .agent(source_id)
                            .ok_or_else(|| PlanError::UnresolvedAgent {
                                agent: agent.id.clone(),
                                target: source_id.clone(),
                            })?;
                    let topic = match self.agent_output(source, topics, &link_outputs)? {
                        Some(topic) => topic,
                        None => {
                            let topic = self.implicit_topic(source_id, &agent.id, cluster)?;
                            register_topic(&mut plan.topics, &topic)?;
                            topic
                        }
                    };
                    Some(topic)
                }
                None => link_inputs.get(&agent.id).cloned(),
            };
            let output = self.agent_output(agent, topics, &link_outputs)?;

            let node = self.build_node(agent, cluster_type, input, output)?;
            debug!(
                pipeline = %pipeline.id,
                agent = %node.id,
                component_type = ?node.component_type,
                input = ?node.input.as_ref().map(|t| &t.fully_qualified_name),
                output = ?node.output.as_ref().map(|t| &t.fully_qualified_name),
                "Compiled agent"
            );
            plan.agents.insert(node.id.clone(), node);
        }

        info!(
            application_id = %self.application_id,
            agents = plan.agents.len(),
            topics = plan.topics.len(),
            "Compiled execution plan"
        );
        Ok(plan)
    }

    fn map_topic(
        &self,
        definition: &TopicDefinition,
        cluster: &StreamingCluster,
    ) -> Result<TopicImplementation> {
        self.streaming
            .create_topic_implementation(definition, cluster)
            .map_err(|source| PlanError::Topic {
                topic: definition.name.clone(),
                source,
            })
    }

    fn implicit_topic(
        &self,
        from: &str,
        to: &str,
        cluster: &StreamingCluster,
    ) -> Result<TopicImplementation> {
        let definition = TopicDefinition::new(
            implicit_topic_name(self.application_id, from, to),
            CreationMode::CreateIfNotExists,
        );
        let mut topic = self.map_topic(&definition, cluster)?;
        topic.implicit = true;
        Ok(topic)
    }

    fn agent_output(
        &self,
        agent: &AgentConfiguration,
        topics: &ModuleTopics,
        link_outputs: &BTreeMap<String, TopicImplementation>,
    ) -> Result<Option<TopicImplementation>> {
        match &agent.output {
            Some(Connection::Topic(name)) => Ok(Some(lookup_topic(topics, &agent.id, name)?.clone())),
            Some(Connection::Agent(_)) => Ok(link_outputs.get(&agent.id).cloned()),
            None => Ok(None),
        }
    }

    fn build_node(
        &self,
        agent: &AgentConfiguration,
        cluster_type: &str,
        input: Option<TopicImplementation>,
        output: Option<TopicImplementation>,
    ) -> Result<AgentNode> {
        let unsupported = |source: RegistryError| PlanError::UnsupportedAgentType {
            agent: agent.id.clone(),
            agent_type: agent.agent_type.clone(),
            cluster_type: cluster_type.to_string(),
            source,
        };
        let provider = self
            .registry
            .lookup(&agent.agent_type, cluster_type)
            .map_err(unsupported)?;
        let component_type = provider.component_type(agent).map_err(unsupported)?;

        Ok(AgentNode {
            id: agent.id.clone(),
            agent_type: agent.agent_type.clone(),
            component_type,
            configuration: provider.agent_configuration(agent),
            input,
            output,
            resources: agent.resources,
            custom_metadata: provider.custom_metadata(agent),
        })
    }
}

/// Add `topic` to the plan. Modules may share a physical topic only when
/// they declare it identically.
fn register_topic(
    topics: &mut BTreeMap<String, TopicImplementation>,
    topic: &TopicImplementation,
) -> Result<()> {
    match topics.get(&topic.fully_qualified_name) {
        Some(existing) if existing != topic => Err(PlanError::ConflictingTopic {
            topic: topic.fully_qualified_name.clone(),
        }),
        Some(_) => Ok(()),
        None => {
            topics.insert(topic.fully_qualified_name.clone(), topic.clone());
            Ok(())
        }
    }
}

fn lookup_topic<'t>(
    topics: &'t ModuleTopics,
    agent: &str,
    name: &str,
) -> Result<&'t TopicImplementation> {
    topics.get(name).ok_or_else(|| PlanError::UnresolvedTopic {
        agent: agent.to_string(),
        topic: name.to_string(),
    })
}
