//! Pulsar streaming runtime.
//!
//! Topics live in a `tenant/namespace` hierarchy and are addressed as
//! `persistent://tenant/namespace/name`. Logical topics land in the cluster's
//! default tenant and namespace unless the topic name is already fully
//! qualified.

mod admin;

pub use admin::{PulsarAdminClient, PulsarAdminConnector};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{
    cluster_config, config_map, delete_topics, deploy_topics, plan_cluster, Result,
    StreamingClusterRuntime, StreamingError, TopicAdminConnector,
};
use crate::model::{ConfigMap, StreamingCluster, TopicDefinition};
use crate::plan::{AgentNode, ExecutionPlan, PhysicalTopicName, TopicImplementation};

/// Streaming-cluster type tag for Pulsar.
pub const PULSAR_CLUSTER_TYPE: &str = "pulsar";

const PERSISTENT_PREFIX: &str = "persistent://";
const DEFAULT_SERVICE_URL: &str = "http://localhost:8080";

/// Admin endpoint settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PulsarAdminConfig {
    pub service_url: String,
    /// Bearer token sent with every admin request.
    pub token: Option<String>,
}

impl Default for PulsarAdminConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            token: None,
        }
    }
}

/// Streaming-cluster configuration for Pulsar.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PulsarClusterConfig {
    pub admin: PulsarAdminConfig,
    pub default_tenant: String,
    pub default_namespace: String,
}

impl Default for PulsarClusterConfig {
    fn default() -> Self {
        Self {
            admin: PulsarAdminConfig::default(),
            default_tenant: "public".to_string(),
            default_namespace: "default".to_string(),
        }
    }
}

impl PulsarClusterConfig {
    pub fn from_cluster(cluster: &StreamingCluster) -> Result<Self> {
        cluster_config(cluster)
    }
}

/// Parse a topic name into its physical identity.
///
/// Accepts `persistent://t/ns/name`, `t/ns/name`, or a bare name that is
/// placed in the defaults.
pub fn parse_topic_name(name: &str, config: &PulsarClusterConfig) -> Result<PhysicalTopicName> {
    let stripped = name.strip_prefix(PERSISTENT_PREFIX);
    let parts: Vec<&str> = stripped.unwrap_or(name).split('/').collect();

    match parts.as_slice() {
        [tenant, namespace, topic]
            if !tenant.is_empty() && !namespace.is_empty() && !topic.is_empty() =>
        {
            Ok(PhysicalTopicName {
                tenant: tenant.to_string(),
                namespace: namespace.to_string(),
                name: topic.to_string(),
            })
        }
        [topic] if stripped.is_none() && !topic.is_empty() => Ok(PhysicalTopicName {
            tenant: config.default_tenant.clone(),
            namespace: config.default_namespace.clone(),
            name: topic.to_string(),
        }),
        _ => Err(StreamingError::InvalidTopicName(name.to_string())),
    }
}

pub fn fully_qualified_name(name: &PhysicalTopicName) -> String {
    format!(
        "{PERSISTENT_PREFIX}{}/{}/{}",
        name.tenant, name.namespace, name.name
    )
}

/// Pulsar implementation of [`StreamingClusterRuntime`].
pub struct PulsarStreamingClusterRuntime {
    connector: Arc<dyn TopicAdminConnector>,
}

impl PulsarStreamingClusterRuntime {
    /// Runtime talking to the broker's admin REST API.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(PulsarAdminConnector))
    }

    pub fn with_connector(connector: Arc<dyn TopicAdminConnector>) -> Self {
        Self { connector }
    }
}

impl Default for PulsarStreamingClusterRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamingClusterRuntime for PulsarStreamingClusterRuntime {
    fn cluster_type(&self) -> &str {
        PULSAR_CLUSTER_TYPE
    }

    fn create_topic_implementation(
        &self,
        topic: &TopicDefinition,
        cluster: &StreamingCluster,
    ) -> Result<TopicImplementation> {
        let config = PulsarClusterConfig::from_cluster(cluster)?;
        let name = parse_topic_name(&topic.name, &config)?;
        Ok(TopicImplementation {
            logical_name: topic.name.clone(),
            fully_qualified_name: fully_qualified_name(&name),
            name,
            creation_mode: topic.creation_mode,
            schema: topic.schema.clone(),
            partitions: topic.partitions,
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
            ("subscriptionName", format!("{application_id}-{}", agent.id)),
        ])
    }

    fn create_producer_configuration(
        &self,
        _application_id: &str,
        _agent: &AgentNode,
        output: &TopicImplementation,
    ) -> ConfigMap {
        let mut config = config_map([("topic", output.fully_qualified_name.clone())]);
        if let Some(schema) = &output.schema {
            config.insert(
                "schemaType".to_string(),
                Value::from(schema.schema_type.to_uppercase()),
            );
        }
        config
    }

    async fn deploy(&self, plan: &ExecutionPlan) -> Result<()> {
        let cluster = plan_cluster(plan)?;
        let admin = self.connector.connect(cluster).await?;
        info!(
            application_id = %plan.application_id,
            topics = plan.topics.len(),
            "Deploying Pulsar topics"
        );
        deploy_topics(admin.as_ref(), plan).await
    }

    async fn delete(&self, plan: &ExecutionPlan) -> Result<()> {
        let cluster = plan_cluster(plan)?;
        let admin = self.connector.connect(cluster).await?;
        info!(
            application_id = %plan.application_id,
            topics = plan.topics.len(),
            "Deleting Pulsar topics"
        );
        delete_topics(admin.as_ref(), plan).await
    }
}
