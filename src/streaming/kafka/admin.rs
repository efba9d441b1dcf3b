//! librdkafka-backed topic admin.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use tracing::debug;

use super::{KafkaClusterConfig, SchemaRegistryClient};
use crate::model::{SchemaDefinition, StreamingCluster};
use crate::plan::TopicImplementation;
use crate::streaming::{Result, StreamingError, TopicAdmin, TopicAdminConnector};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

fn kafka_error(err: KafkaError) -> StreamingError {
    StreamingError::Admin(err.to_string())
}

fn partition_count(partitions: u32) -> Result<i32> {
    i32::try_from(partitions).map_err(|_| {
        StreamingError::InvalidConfiguration(format!(
            "partitions must be at most {}, got {partitions}",
            i32::MAX
        ))
    })
}

/// Topic admin for one Kafka cluster.
pub struct KafkaTopicAdmin {
    admin: Arc<AdminClient<DefaultClientContext>>,
    replication_factor: i32,
    default_partitions: u32,
    registry: Option<SchemaRegistryClient>,
}

impl KafkaTopicAdmin {
    pub fn new(config: &KafkaClusterConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        for (key, value) in config.client_properties() {
            client_config.set(key, value);
        }
        let admin: AdminClient<DefaultClientContext> =
            client_config.create().map_err(kafka_error)?;
        let registry = config
            .schema_registry_url
            .as_deref()
            .map(SchemaRegistryClient::new)
            .transpose()?;

        Ok(Self {
            admin: Arc::new(admin),
            replication_factor: config.replication_factor,
            default_partitions: config.partitions,
            registry,
        })
    }
}

#[async_trait]
impl TopicAdmin for KafkaTopicAdmin {
    async fn list_topics(&self, _tenant: &str, _namespace: &str) -> Result<Vec<String>> {
        let admin = Arc::clone(&self.admin);
        let metadata = tokio::task::spawn_blocking(move || {
            admin.inner().fetch_metadata(None, METADATA_TIMEOUT)
        })
        .await
        .map_err(|e| StreamingError::Admin(e.to_string()))?
        .map_err(kafka_error)?;

        Ok(metadata
            .topics()
            .iter()
            .map(|t| t.name().to_string())
            .collect())
    }

    async fn create_topic(&self, topic: &TopicImplementation) -> Result<()> {
        let partitions = partition_count(topic.partitions.unwrap_or(self.default_partitions))?;
        let new_topic = NewTopic::new(
            &topic.fully_qualified_name,
            partitions,
            TopicReplication::Fixed(self.replication_factor),
        );
        debug!(topic = %topic.fully_qualified_name, partitions, "Creating Kafka topic");

        let results = self
            .admin
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
            .map_err(kafka_error)?;
        for result in results {
            match result {
                Ok(_) => {}
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    return Err(StreamingError::TopicAlreadyExists(name))
                }
                Err((name, code)) => {
                    return Err(StreamingError::Admin(format!("{name}: {code}")))
                }
            }
        }
        Ok(())
    }

    async fn delete_topic(&self, topic: &TopicImplementation) -> Result<()> {
        let results = self
            .admin
            .delete_topics(&[topic.fully_qualified_name.as_str()], &AdminOptions::new())
            .await
            .map_err(kafka_error)?;
        for result in results {
            match result {
                Ok(_) => {}
                Err((name, RDKafkaErrorCode::UnknownTopicOrPartition)) => {
                    return Err(StreamingError::TopicNotFound(name))
                }
                Err((name, code)) => {
                    return Err(StreamingError::Admin(format!("{name}: {code}")))
                }
            }
        }
        Ok(())
    }

    async fn list_schemas(&self, topic: &TopicImplementation) -> Result<Vec<SchemaDefinition>> {
        match &self.registry {
            Some(registry) => registry.list_schemas(&topic.fully_qualified_name).await,
            None => Ok(Vec::new()),
        }
    }

    async fn create_schema(
        &self,
        topic: &TopicImplementation,
        schema: &SchemaDefinition,
    ) -> Result<()> {
        match &self.registry {
            Some(registry) => {
                registry
                    .create_schema(&topic.fully_qualified_name, schema)
                    .await
            }
            None => Err(StreamingError::SchemaRegistryNotConfigured(
                topic.fully_qualified_name.clone(),
            )),
        }
    }
}

/// Builds a [`KafkaTopicAdmin`] from the streaming-cluster config.
#[derive(Debug, Default, Clone, Copy)]
pub struct KafkaAdminConnector;

#[async_trait]
impl TopicAdminConnector for KafkaAdminConnector {
    async fn connect(&self, cluster: &StreamingCluster) -> Result<Arc<dyn TopicAdmin>> {
        let config = KafkaClusterConfig::from_cluster(cluster)?;
        Ok(Arc::new(KafkaTopicAdmin::new(&config)?))
    }
}
