//! Streaming cluster runtimes.
//!
//! This module contains:
//! - `StreamingClusterRuntime` trait: maps logical topics to physical ones and
//!   provisions them on a broker
//! - `TopicAdmin` / `TopicAdminConnector` traits: the broker admin seam
//! - Shared idempotent provisioning used by every broker implementation
//! - Implementations: Pulsar (admin REST API), Kafka, in-memory mock

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::model::{ConfigMap, CreationMode, SchemaDefinition, StreamingCluster, TopicDefinition};
use crate::plan::{AgentNode, ExecutionPlan, TopicImplementation};

// Implementation modules
pub mod kafka;
pub mod mock;
pub mod pulsar;

// Re-exports
pub use kafka::{KafkaClusterConfig, KafkaStreamingClusterRuntime, KAFKA_CLUSTER_TYPE};
pub use mock::InMemoryTopicAdmin;
pub use pulsar::{
    PulsarAdminClient, PulsarAdminConnector, PulsarClusterConfig, PulsarStreamingClusterRuntime,
    PULSAR_CLUSTER_TYPE,
};

// ============================================================================
// Traits
// ============================================================================

/// Result type for streaming operations.
pub type Result<T> = std::result::Result<T, StreamingError>;

/// Errors that can occur while mapping or provisioning topics.
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    #[error("Topic {0} already exists")]
    TopicAlreadyExists(String),

    #[error("Topic {0} not found")]
    TopicNotFound(String),

    #[error("Execution plan has no streaming cluster")]
    MissingStreamingCluster,

    #[error("Invalid streaming cluster configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid topic name '{0}'")]
    InvalidTopicName(String),

    #[error("Broker admin request failed: {0}")]
    Admin(String),

    #[error("Broker admin unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No schema registry configured; cannot publish schema for topic {0}")]
    SchemaRegistryNotConfigured(String),
}

/// Broker admin operations needed to reconcile topics.
///
/// Topic names passed in and returned are fully qualified for the broker.
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    /// List fully-qualified topic names in a tenant/namespace scope.
    async fn list_topics(&self, tenant: &str, namespace: &str) -> Result<Vec<String>>;

    /// Create a topic. Returns `TopicAlreadyExists` if it is already there.
    async fn create_topic(&self, topic: &TopicImplementation) -> Result<()>;

    /// Delete a topic. Returns `TopicNotFound` if it is not there.
    async fn delete_topic(&self, topic: &TopicImplementation) -> Result<()>;

    /// Schemas currently registered for a topic.
    async fn list_schemas(&self, topic: &TopicImplementation) -> Result<Vec<SchemaDefinition>>;

    /// Register a schema for a topic.
    async fn create_schema(
        &self,
        topic: &TopicImplementation,
        schema: &SchemaDefinition,
    ) -> Result<()>;
}

/// Builds a `TopicAdmin` for a streaming cluster descriptor.
///
/// The descriptor comes from the application's instance document, so admins
/// are created per deploy/delete call.
#[async_trait]
pub trait TopicAdminConnector: Send + Sync {
    async fn connect(&self, cluster: &StreamingCluster) -> Result<Arc<dyn TopicAdmin>>;
}

/// One implementation per broker technology.
#[async_trait]
pub trait StreamingClusterRuntime: Send + Sync {
    /// Streaming-cluster type tag this runtime serves (`pulsar`, `kafka`).
    fn cluster_type(&self) -> &str;

    /// Map a logical topic to its physical identity. Performs no I/O.
    fn create_topic_implementation(
        &self,
        topic: &TopicDefinition,
        cluster: &StreamingCluster,
    ) -> Result<TopicImplementation>;

    /// Consumer settings for an agent reading `input`.
    fn create_consumer_configuration(
        &self,
        application_id: &str,
        agent: &AgentNode,
        input: &TopicImplementation,
    ) -> ConfigMap;

    /// Producer settings for an agent writing `output`.
    fn create_producer_configuration(
        &self,
        application_id: &str,
        agent: &AgentNode,
        output: &TopicImplementation,
    ) -> ConfigMap;

    /// Ensure every topic of the plan exists, then publish missing schemas.
    async fn deploy(&self, plan: &ExecutionPlan) -> Result<()>;

    /// Delete every topic of the plan.
    async fn delete(&self, plan: &ExecutionPlan) -> Result<()>;
}

// ============================================================================
// Provisioning
// ============================================================================

/// Idempotently provision every topic of a plan.
///
/// Stops at the first failure; topics created earlier in the call are kept.
pub async fn deploy_topics(admin: &dyn TopicAdmin, plan: &ExecutionPlan) -> Result<()> {
    for topic in plan.topics.values() {
        deploy_topic(admin, topic).await?;
    }
    Ok(())
}

/// Delete every topic of a plan, treating missing topics as deleted.
pub async fn delete_topics(admin: &dyn TopicAdmin, plan: &ExecutionPlan) -> Result<()> {
    for topic in plan.topics.values() {
        delete_topic(admin, topic).await?;
    }
    Ok(())
}

async fn deploy_topic(admin: &dyn TopicAdmin, topic: &TopicImplementation) -> Result<()> {
    let name = &topic.fully_qualified_name;

    match topic.creation_mode {
        CreationMode::CreateIfNotExists => {
            let existing = admin
                .list_topics(&topic.name.tenant, &topic.name.namespace)
                .await?;
            debug!(topic = %name, existing = ?existing, "Listed topics");

            if existing.iter().any(|t| t == name) {
                info!(topic = %name, "Topic already exists");
            } else {
                match admin.create_topic(topic).await {
                    Ok(()) => info!(topic = %name, "Created topic"),
                    Err(StreamingError::TopicAlreadyExists(_)) => {
                        info!(topic = %name, "Topic created concurrently, not a problem")
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        CreationMode::None => {
            debug!(topic = %name, "Creation mode is none, skipping topic creation");
        }
    }

    if let Some(schema) = &topic.schema {
        let schemas = admin.list_schemas(topic).await?;
        if schemas.is_empty() {
            admin.create_schema(topic, schema).await?;
            info!(topic = %name, schema_type = %schema.schema_type, "Published schema");
        } else {
            info!(
                topic = %name,
                registered = schemas.len(),
                "Topic already has schemas, skipping"
            );
        }
    }

    Ok(())
}

async fn delete_topic(admin: &dyn TopicAdmin, topic: &TopicImplementation) -> Result<()> {
    let name = &topic.fully_qualified_name;
    info!(topic = %name, "Deleting topic");
    match admin.delete_topic(topic).await {
        Ok(()) => Ok(()),
        Err(StreamingError::TopicNotFound(_)) => {
            info!(topic = %name, "Topic didn't exist, not a problem");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Streaming cluster of a plan, or an error when the plan has none.
pub(crate) fn plan_cluster(plan: &ExecutionPlan) -> Result<&StreamingCluster> {
    plan.streaming_cluster()
        .ok_or(StreamingError::MissingStreamingCluster)
}

/// Decode a cluster's free-form configuration into a typed config.
pub(crate) fn cluster_config<T: DeserializeOwned>(cluster: &StreamingCluster) -> Result<T> {
    let map: serde_json::Map<String, serde_json::Value> = cluster
        .configuration
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    serde_json::from_value(serde_json::Value::Object(map))
        .map_err(|e| StreamingError::InvalidConfiguration(e.to_string()))
}

/// Build a `ConfigMap` from string pairs.
pub(crate) fn config_map<'a>(entries: impl IntoIterator<Item = (&'a str, String)>) -> ConfigMap {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
        .collect::<BTreeMap<_, _>>()
}
