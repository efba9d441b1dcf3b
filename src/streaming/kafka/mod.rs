//! Kafka streaming runtime.
//!
//! Kafka has a flat topic namespace: the physical name is the logical name
//! and tenant/namespace are empty. Schemas are published to a Confluent
//! compatible schema registry when one is configured.

#[cfg(feature = "kafka")]
mod admin;
mod registry;

#[cfg(feature = "kafka")]
pub use admin::{KafkaAdminConnector, KafkaTopicAdmin};
pub use registry::SchemaRegistryClient;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{
    cluster_config, config_map, delete_topics, deploy_topics, plan_cluster, Result,
    StreamingClusterRuntime, StreamingError, TopicAdminConnector,
};
use crate::model::{ConfigMap, StreamingCluster, TopicDefinition};
use crate::plan::{AgentNode, ExecutionPlan, PhysicalTopicName, TopicImplementation};

/// Streaming-cluster type tag for Kafka.
pub const KAFKA_CLUSTER_TYPE: &str = "kafka";

/// Prefix of consumer group ids.
const GROUP_ID_PREFIX: &str = "pipewright";

/// Streaming-cluster configuration for Kafka.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct KafkaClusterConfig {
    /// librdkafka client properties (`bootstrap.servers`, security, ...).
    pub admin: ConfigMap,
    pub replication_factor: i32,
    /// Partitions for topics that do not declare their own.
    pub partitions: u32,
    pub schema_registry_url: Option<String>,
}

impl Default for KafkaClusterConfig {
    fn default() -> Self {
        Self {
            admin: ConfigMap::new(),
            replication_factor: 1,
            partitions: 1,
            schema_registry_url: None,
        }
    }
}

impl KafkaClusterConfig {
    pub fn from_cluster(cluster: &StreamingCluster) -> Result<Self> {
        let config: Self = cluster_config(cluster)?;
        if config.replication_factor < 1 {
            return Err(StreamingError::InvalidConfiguration(format!(
                "replicationFactor must be at least 1, got {}",
                config.replication_factor
            )));
        }
        Ok(config)
    }

    /// Client properties as strings.
    pub fn client_properties(&self) -> impl Iterator<Item = (&str, String)> {
        self.admin.iter().map(|(k, v)| {
            let value = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.as_str(), value)
        })
    }
}

/// Kafka implementation of [`StreamingClusterRuntime`].
pub struct KafkaStreamingClusterRuntime {
    connector: Arc<dyn TopicAdminConnector>,
}

impl KafkaStreamingClusterRuntime {
    /// Runtime using the librdkafka admin client.
    #[cfg(feature = "kafka")]
    pub fn new() -> Self {
        Self::with_connector(Arc::new(KafkaAdminConnector))
    }

    pub fn with_connector(connector: Arc<dyn TopicAdminConnector>) -> Self {
        Self { connector }
    }
}

#[cfg(feature = "kafka")]
impl Default for KafkaStreamingClusterRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamingClusterRuntime for KafkaStreamingClusterRuntime {
    fn cluster_type(&self) -> &str {
        KAFKA_CLUSTER_TYPE
    }

    fn create_topic_implementation(
        &self,
        topic: &TopicDefinition,
        cluster: &StreamingCluster,
    ) -> Result<TopicImplementation> {
        let config = KafkaClusterConfig::from_cluster(cluster)?;
        if topic.name.is_empty() || topic.name.contains('/') {
            return Err(StreamingError::InvalidTopicName(topic.name.clone()));
        }
        Ok(TopicImplementation {
            logical_name: topic.name.clone(),
            name: PhysicalTopicName {
                tenant: String::new(),
                namespace: String::new(),
                name: topic.name.clone(),
            },
            fully_qualified_name: topic.name.clone(),
            creation_mode: topic.creation_mode,
            schema: topic.schema.clone(),
            partitions: Some(topic.partitions.unwrap_or(config.partitions)),
            implicit: false,
        })
    }

    fn create_consumer_configuration(
        &self,
        application_id: &str,
        agent: &AgentNode,
        input: &TopicImplementation,
    ) -> ConfigMap {
        config_map([
            ("topic", input.fully_qualified_name.clone()),
            (
                "group.id",
                format!("{GROUP_ID_PREFIX}-{application_id}-{}", agent.id),
            ),
            ("auto.offset.reset", "earliest".to_string()),
            ("enable.auto.commit", "false".to_string()),
        ])
    }

    fn create_producer_configuration(
        &self,
        _application_id: &str,
        _agent: &AgentNode,
        output: &TopicImplementation,
    ) -> ConfigMap {
        config_map([("topic", output.fully_qualified_name.clone())])
    }

    async fn deploy(&self, plan: &ExecutionPlan) -> Result<()> {
        let cluster = plan_cluster(plan)?;
        let admin = self.connector.connect(cluster).await?;
        info!(
            application_id = %plan.application_id,
            topics = plan.topics.len(),
            "Deploying Kafka topics"
        );
        deploy_topics(admin.as_ref(), plan).await
    }

    async fn delete(&self, plan: &ExecutionPlan) -> Result<()> {
        let cluster = plan_cluster(plan)?;
        let admin = self.connector.connect(cluster).await?;
        info!(
            application_id = %plan.application_id,
            topics = plan.topics.len(),
            "Deleting Kafka topics"
        );
        delete_topics(admin.as_ref(), plan).await
    }
}
