//! Confluent-compatible schema registry client.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::SchemaDefinition;
use crate::streaming::{Result, StreamingError};

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubjectVersion {
    schema: String,
    #[serde(default)]
    schema_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterSchema<'a> {
    schema: &'a str,
    schema_type: String,
}

/// Registers value schemas under the `<topic>-value` subject.
pub struct SchemaRegistryClient {
    client: Client,
    url: String,
}

impl SchemaRegistryClient {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    pub fn subject(topic: &str) -> String {
        format!("{topic}-value")
    }

    fn versions_url(&self, topic: &str) -> String {
        format!("{}/subjects/{}/versions", self.url, Self::subject(topic))
    }

    /// Latest schema registered for a topic, if any.
    pub async fn list_schemas(&self, topic: &str) -> Result<Vec<SchemaDefinition>> {
        let url = format!("{}/latest", self.versions_url(topic));
        debug!(url = %url, "Fetching latest schema");
        let response = self.client.get(&url).send().await?;
        match response.status() {
            s if s.is_success() => {
                let version: SubjectVersion = response.json().await?;
                Ok(vec![SchemaDefinition {
                    schema_type: version
                        .schema_type
                        .unwrap_or_else(|| "AVRO".to_string())
                        .to_lowercase(),
                    schema: Some(version.schema),
                    name: None,
                }])
            }
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status => Err(StreamingError::Admin(format!(
                "schema registry returned HTTP {status}"
            ))),
        }
    }

    pub async fn create_schema(&self, topic: &str, schema: &SchemaDefinition) -> Result<()> {
        let body = RegisterSchema {
            schema: schema.schema.as_deref().unwrap_or_default(),
            schema_type: schema.schema_type.to_uppercase(),
        };
        let response = self
            .client
            .post(self.versions_url(topic))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(StreamingError::Admin(format!(
                "schema registry returned HTTP {status} - {text}"
            )));
        }
        Ok(())
    }
}
