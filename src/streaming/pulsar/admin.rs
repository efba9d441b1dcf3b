//! Pulsar admin REST client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::PulsarClusterConfig;
use crate::model::{SchemaDefinition, StreamingCluster};
use crate::plan::TopicImplementation;
use crate::streaming::{Result, StreamingError, TopicAdmin, TopicAdminConnector};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct SchemasResponse {
    #[serde(rename = "getSchemaResponses", default)]
    schemas: Vec<SchemaResponse>,
}

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    #[serde(rename = "type")]
    schema_type: String,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Serialize)]
struct PostSchemaPayload<'a> {
    #[serde(rename = "type")]
    schema_type: String,
    schema: &'a str,
    properties: serde_json::Map<String, serde_json::Value>,
}

/// Admin client for one Pulsar cluster.
pub struct PulsarAdminClient {
    client: Client,
    service_url: String,
    token: Option<String>,
}

impl PulsarAdminClient {
    pub fn new(config: &PulsarClusterConfig) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            service_url: config.admin.service_url.trim_end_matches('/').to_string(),
            token: config.admin.token.clone(),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn topic_path(topic: &TopicImplementation) -> String {
        format!(
            "persistent/{}/{}/{}",
            topic.name.tenant, topic.name.namespace, topic.name.name
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/admin/v2/{}", self.service_url, path)
    }

    /// Send a request once. Throttling and server errors surface as
    /// [`StreamingError::Unavailable`] for the caller to retry.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Pulsar admin unavailable");
            return Err(StreamingError::Unavailable(format!("HTTP {status}")));
        }
        Ok(response)
    }

    async fn failure(response: Response) -> StreamingError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        StreamingError::Admin(format!(
            "HTTP {} - {}",
            status,
            body.chars().take(200).collect::<String>()
        ))
    }
}

#[async_trait]
impl TopicAdmin for PulsarAdminClient {
    async fn list_topics(&self, tenant: &str, namespace: &str) -> Result<Vec<String>> {
        let url = self.url(&format!("persistent/{tenant}/{namespace}"));
        debug!(url = %url, "Listing topics");
        let response = self.send(self.client.get(&url)).await?;
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        Ok(response.json().await?)
    }

    async fn create_topic(&self, topic: &TopicImplementation) -> Result<()> {
        let url = self.url(&Self::topic_path(topic));
        let response = self.send(self.client.put(&url)).await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(StreamingError::TopicAlreadyExists(
                topic.fully_qualified_name.clone(),
            )),
            _ => Err(Self::failure(response).await),
        }
    }

    async fn delete_topic(&self, topic: &TopicImplementation) -> Result<()> {
        let url = self.url(&Self::topic_path(topic));
        let response = self
            .send(self.client.delete(&url).query(&[("force", "true")]))
            .await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StreamingError::TopicNotFound(
                topic.fully_qualified_name.clone(),
            )),
            _ => Err(Self::failure(response).await),
        }
    }

    async fn list_schemas(&self, topic: &TopicImplementation) -> Result<Vec<SchemaDefinition>> {
        let url = self.url(&format!(
            "schemas/{}/{}/{}/schemas",
            topic.name.tenant, topic.name.namespace, topic.name.name
        ));
        let response = self.send(self.client.get(&url)).await?;
        match response.status() {
            s if s.is_success() => {
                let body: SchemasResponse = response.json().await?;
                Ok(body
                    .schemas
                    .into_iter()
                    .map(|s| SchemaDefinition {
                        schema_type: s.schema_type.to_lowercase(),
                        schema: s.data,
                        name: None,
                    })
                    .collect())
            }
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            _ => Err(Self::failure(response).await),
        }
    }

    async fn create_schema(
        &self,
        topic: &TopicImplementation,
        schema: &SchemaDefinition,
    ) -> Result<()> {
        let url = self.url(&format!(
            "schemas/{}/{}/{}/schema",
            topic.name.tenant, topic.name.namespace, topic.name.name
        ));
        let payload = PostSchemaPayload {
            schema_type: schema.schema_type.to_uppercase(),
            schema: schema.schema.as_deref().unwrap_or_default(),
            properties: serde_json::Map::new(),
        };
        let response = self.send(self.client.post(&url).json(&payload)).await?;
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        Ok(())
    }
}

/// Connects to the admin endpoint named in the streaming-cluster config.
#[derive(Debug, Default, Clone, Copy)]
pub struct PulsarAdminConnector;

#[async_trait]
impl TopicAdminConnector for PulsarAdminConnector {
    async fn connect(&self, cluster: &StreamingCluster) -> Result<Arc<dyn TopicAdmin>> {
        let config = PulsarClusterConfig::from_cluster(cluster)?;
        debug!(service_url = %config.admin.service_url, "Connecting to Pulsar admin");
        Ok(Arc::new(PulsarAdminClient::new(&config)?))
    }
}
