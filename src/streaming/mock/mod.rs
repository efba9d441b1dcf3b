//! In-memory broker admin for testing.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Result, StreamingError, TopicAdmin, TopicAdminConnector};
use crate::model::{SchemaDefinition, StreamingCluster};
use crate::plan::TopicImplementation;

#[derive(Default)]
struct State {
    topics: BTreeMap<String, TopicImplementation>,
    schemas: BTreeMap<String, Vec<SchemaDefinition>>,
    create_calls: usize,
    delete_calls: usize,
    schema_calls: usize,
    fail_on_create: bool,
}

/// Topic admin backed by an in-memory map.
///
/// Clones share state, so the same instance can be handed to a runtime as
/// its connector and inspected by the test afterwards.
#[derive(Clone, Default)]
pub struct InMemoryTopicAdmin {
    state: Arc<RwLock<State>>,
}

impl InMemoryTopicAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a topic as if something else created it.
    pub async fn insert_topic(&self, topic: TopicImplementation) {
        self.state
            .write()
            .await
            .topics
            .insert(topic.fully_qualified_name.clone(), topic);
    }

    /// Pre-register a schema on a topic.
    pub async fn insert_schema(&self, fully_qualified_name: &str, schema: SchemaDefinition) {
        self.state
            .write()
            .await
            .schemas
            .entry(fully_qualified_name.to_string())
            .or_default()
            .push(schema);
    }

    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    pub async fn topic_names(&self) -> Vec<String> {
        self.state.read().await.topics.keys().cloned().collect()
    }

    pub async fn has_topic(&self, fully_qualified_name: &str) -> bool {
        self.state
            .read()
            .await
            .topics
            .contains_key(fully_qualified_name)
    }

    pub async fn schemas(&self, fully_qualified_name: &str) -> Vec<SchemaDefinition> {
        self.state
            .read()
            .await
            .schemas
            .get(fully_qualified_name)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn create_calls(&self) -> usize {
        self.state.read().await.create_calls
    }

    pub async fn delete_calls(&self) -> usize {
        self.state.read().await.delete_calls
    }

    pub async fn schema_calls(&self) -> usize {
        self.state.read().await.schema_calls
    }
}

#[async_trait]
impl TopicAdmin for InMemoryTopicAdmin {
    async fn list_topics(&self, tenant: &str, namespace: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .read()
            .await
            .topics
            .values()
            .filter(|t| t.name.tenant == tenant && t.name.namespace == namespace)
            .map(|t| t.fully_qualified_name.clone())
            .collect())
    }

    async fn create_topic(&self, topic: &TopicImplementation) -> Result<()> {
        let mut state = self.state.write().await;
        state.create_calls += 1;
        if state.fail_on_create {
            return Err(StreamingError::Admin("Mock create failure".to_string()));
        }
        if state.topics.contains_key(&topic.fully_qualified_name) {
            return Err(StreamingError::TopicAlreadyExists(
                topic.fully_qualified_name.clone(),
            ));
        }
        state
            .topics
            .insert(topic.fully_qualified_name.clone(), topic.clone());
        Ok(())
    }

    async fn delete_topic(&self, topic: &TopicImplementation) -> Result<()> {
        let mut state = self.state.write().await;
        state.delete_calls += 1;
        state.schemas.remove(&topic.fully_qualified_name);
        match state.topics.remove(&topic.fully_qualified_name) {
            Some(_) => Ok(()),
            None => Err(StreamingError::TopicNotFound(
                topic.fully_qualified_name.clone(),
            )),
        }
    }

    async fn list_schemas(&self, topic: &TopicImplementation) -> Result<Vec<SchemaDefinition>> {
        Ok(self.schemas(&topic.fully_qualified_name).await)
    }

    async fn create_schema(
        &self,
        topic: &TopicImplementation,
        schema: &SchemaDefinition,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.schema_calls += 1;
        state
            .schemas
            .entry(topic.fully_qualified_name.clone())
            .or_default()
            .push(schema.clone());
        Ok(())
    }
}

#[async_trait]
impl TopicAdminConnector for InMemoryTopicAdmin {
    async fn connect(&self, _cluster: &StreamingCluster) -> Result<Arc<dyn TopicAdmin>> {
        Ok(Arc::new(self.clone()))
    }
}
