//! On-disk shapes of the declarative documents.
//!
//! These mirror the YAML layout one-to-one and are converted into the
//! logical model by the builder.

use serde::Deserialize;

use crate::model::{ConfigMap, Instance, Resource, ResourcesSpec, Secret, TopicDefinition};

/// Reserved document carrying shared resources.
pub const CONFIGURATION_DOCUMENT: &str = "configuration";
/// Reserved document carrying secrets.
pub const SECRETS_DOCUMENT: &str = "secrets";
/// Reserved document carrying the target instance.
pub const INSTANCE_DOCUMENT: &str = "instance";

/// Extensions recognised as declarative documents.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["yaml", "yml"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PipelineFileModel {
    pub module: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub topics: Vec<TopicDefinition>,
    pub pipeline: Vec<AgentModel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AgentModel {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub agent_type: String,
    pub input: Option<String>,
    pub output: Option<String>,
    #[serde(default)]
    pub configuration: ConfigMap,
    #[serde(default)]
    pub resources: ResourcesSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ConfigurationFileModel {
    pub configuration: Option<ConfigurationNodeModel>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ConfigurationNodeModel {
    pub resources: Vec<Resource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SecretsFileModel {
    pub secrets: Vec<Secret>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct InstanceFileModel {
    pub instance: Option<Instance>,
}

/// Classification of a document by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Configuration,
    Secrets,
    Instance,
    Pipeline,
    /// Not a declarative document.
    Ignored,
}

impl DocumentKind {
    /// Classify a document from its (possibly path-qualified) name.
    pub fn classify(name: &str) -> Self {
        let path = std::path::Path::new(name);
        let is_document = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| DOCUMENT_EXTENSIONS.contains(&e))
            .unwrap_or(false);
        if !is_document {
            return DocumentKind::Ignored;
        }
        match path.file_stem().and_then(|s| s.to_str()) {
            Some(CONFIGURATION_DOCUMENT) => DocumentKind::Configuration,
            Some(SECRETS_DOCUMENT) => DocumentKind::Secrets,
            Some(INSTANCE_DOCUMENT) => DocumentKind::Instance,
            _ => DocumentKind::Pipeline,
        }
    }
}

/// File stem of a document name, used as the default pipeline id.
pub(crate) fn document_stem(name: &str) -> String {
    std::path::Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string()
}
