//! Model builder.
//!
//! Turns an ordered set of declarative documents into a logical
//! [`Application`]. Documents are classified by name: `configuration`,
//! `secrets` and `instance` are reserved, every other YAML document is a
//! pipeline document, anything else is skipped.
//!
//! Multiple documents contribute to the same application. Resources and
//! secrets merge by id, each pipeline document creates exactly one pipeline
//! and registers its topics into its module.
//!
//! Building is deterministic: the same ordered documents always produce the
//! same model, including generated agent ids.

mod documents;

pub use documents::{
    DocumentKind, CONFIGURATION_DOCUMENT, DOCUMENT_EXTENSIONS, INSTANCE_DOCUMENT, SECRETS_DOCUMENT,
};

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::model::{AgentConfiguration, Application, Connection, Module, Pipeline, DEFAULT_MODULE};

use documents::{
    document_stem, ConfigurationFileModel, InstanceFileModel, PipelineFileModel, SecretsFileModel,
};

/// Result type for model building.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors raised while building the logical model.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed document '{document}': {source}")]
    Malformed {
        document: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document '{document}': missing required field '{field}'")]
    MissingField {
        document: String,
        field: &'static str,
    },

    #[error("Document '{document}': agent '{agent}' references unknown topic '{topic}'")]
    UnresolvedReference {
        document: String,
        agent: String,
        topic: String,
    },

    #[error("Document '{document}': duplicate agent id '{agent}' in pipeline '{pipeline}'")]
    DuplicateAgent {
        document: String,
        pipeline: String,
        agent: String,
    },

    #[error("Pipeline '{pipeline}' is defined more than once in module '{module}'")]
    DuplicatePipeline { module: String, pipeline: String },

    #[error("Topic '{topic}' has conflicting definitions in module '{module}'")]
    ConflictingTopic { module: String, topic: String },
}

/// Incrementally builds an [`Application`] from documents.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    application: Application,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an application from `(name, content)` pairs, in order.
    pub fn build<'a, I>(documents: I) -> Result<Application>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut builder = Self::new();
        for (name, content) in documents {
            builder.add_document(name, content)?;
        }
        Ok(builder.finish())
    }

    /// Build an application from every file in the given directories.
    ///
    /// Directories are read in the given order; files inside a directory are
    /// read in file-name order.
    pub fn build_from_directories<P: AsRef<Path>>(directories: &[P]) -> Result<Application> {
        let mut builder = Self::new();
        for directory in directories {
            let directory = directory.as_ref();
            info!(directory = %directory.display(), "Parsing directory");

            let entries = std::fs::read_dir(directory).map_err(|source| ParseError::Io {
                path: directory.to_path_buf(),
                source,
            })?;
            let mut paths = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|source| ParseError::Io {
                    path: directory.to_path_buf(),
                    source,
                })?;
                let path = entry.path();
                if path.is_file() {
                    paths.push(path);
                }
            }
            paths.sort();

            for path in paths {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                if DocumentKind::classify(&name) == DocumentKind::Ignored {
                    info!(document = %name, "Skipping non-declarative file");
                    continue;
                }
                let content = std::fs::read_to_string(&path)
                    .map_err(|source| ParseError::Io { path, source })?;
                builder.add_document(&name, &content)?;
            }
        }
        Ok(builder.finish())
    }

    /// Add one document to the application being built.
    pub fn add_document(&mut self, name: &str, content: &str) -> Result<()> {
        let kind = DocumentKind::classify(name);
        if kind == DocumentKind::Ignored {
            info!(document = %name, "Skipping non-declarative file");
            return Ok(());
        }
        if content.trim().is_empty() {
            debug!(document = %name, "Skipping empty document");
            return Ok(());
        }

        match kind {
            DocumentKind::Configuration => self.parse_configuration(name, content),
            DocumentKind::Secrets => self.parse_secrets(name, content),
            DocumentKind::Instance => self.parse_instance(name, content),
            DocumentKind::Pipeline => self.parse_pipeline(name, content),
            DocumentKind::Ignored => Ok(()),
        }
    }

    pub fn finish(self) -> Application {
        self.application
    }

    fn parse_configuration(&mut self, name: &str, content: &str) -> Result<()> {
        let model: ConfigurationFileModel = decode(name, content)?;
        let resources = model.configuration.map(|c| c.resources).unwrap_or_default();
        info!(document = %name, resources = resources.len(), "Parsed configuration");
        for resource in resources {
            self.application
                .resources
                .insert(resource.id.clone(), resource);
        }
        Ok(())
    }

    fn parse_secrets(&mut self, name: &str, content: &str) -> Result<()> {
        let model: SecretsFileModel = decode(name, content)?;
        // Values are never logged.
        info!(document = %name, secrets = model.secrets.len(), "Parsed secrets");
        for secret in model.secrets {
            self.application.secrets.put(secret);
        }
        Ok(())
    }

    fn parse_instance(&mut self, name: &str, content: &str) -> Result<()> {
        let model: InstanceFileModel = decode(name, content)?;
        let instance = model.instance.ok_or_else(|| ParseError::MissingField {
            document: name.to_string(),
            field: "instance",
        })?;
        info!(
            document = %name,
            streaming_cluster = %instance.streaming_cluster.cluster_type,
            compute_cluster = %instance.compute_cluster.cluster_type,
            "Parsed instance"
        );
        self.application.instance = Some(instance);
        Ok(())
    }

    fn parse_pipeline(&mut self, name: &str, content: &str) -> Result<()> {
        let model: PipelineFileModel = decode(name, content)?;
        let module_id = model
            .module
            .clone()
            .unwrap_or_else(|| DEFAULT_MODULE.to_string());
        let pipeline_id = model.id.clone().unwrap_or_else(|| document_stem(name));

        let module = self.application.module_mut(&module_id);
        if module.pipelines.contains_key(&pipeline_id) {
            return Err(ParseError::DuplicatePipeline {
                module: module_id,
                pipeline: pipeline_id,
            });
        }

        for topic in model.topics {
            match module.topics.get(&topic.name) {
                Some(existing) if *existing != topic => {
                    return Err(ParseError::ConflictingTopic {
                        module: module_id,
                        topic: topic.name,
                    });
                }
                Some(_) => {}
                None => {
                    debug!(module = %module_id, topic = %topic.name, "Registered topic");
                    module.topics.insert(topic.name.clone(), topic);
                }
            }
        }

        let mut pipeline = Pipeline::new(&pipeline_id, model.name);
        // Ids are `<type>_<n>` with n counting only agents lacking an explicit
        // id. Existing deployments depend on this numbering.
        let mut auto_id = 1;

        for agent in model.pipeline {
            if agent.agent_type.is_empty() {
                return Err(ParseError::MissingField {
                    document: name.to_string(),
                    field: "type",
                });
            }
            let id = match agent.id {
                Some(id) => id,
                None => {
                    let id = format!("{}_{}", agent.agent_type, auto_id);
                    auto_id += 1;
                    id
                }
            };
            if pipeline.agent(&id).is_some() {
                return Err(ParseError::DuplicateAgent {
                    document: name.to_string(),
                    pipeline: pipeline_id,
                    agent: id,
                });
            }

            let input = resolve_topic(module, name, &id, agent.input)?;
            let output = resolve_topic(module, name, &id, agent.output)?;

            // Chain to the previous agent unless it already writes somewhere.
            if let Some(previous) = pipeline.agents.last_mut() {
                if previous.output.is_none() {
                    previous.output = Some(Connection::Agent(id.clone()));
                }
            }

            pipeline.agents.push(AgentConfiguration {
                id,
                name: agent.name,
                agent_type: agent.agent_type,
                configuration: agent.configuration,
                input,
                output,
                resources: agent.resources,
            });
        }

        info!(
            document = %name,
            module = %module_id,
            pipeline = %pipeline_id,
            agents = pipeline.agents.len(),
            "Parsed pipeline"
        );
        module.pipelines.insert(pipeline_id, pipeline);
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(name: &str, content: &str) -> Result<T> {
    serde_yaml::from_str(content).map_err(|source| ParseError::Malformed {
        document: name.to_string(),
        source,
    })
}

fn resolve_topic(
    module: &Module,
    document: &str,
    agent: &str,
    reference: Option<String>,
) -> Result<Option<Connection>> {
    match reference {
        None => Ok(None),
        Some(topic) if module.resolve_topic(&topic).is_some() => Ok(Some(Connection::Topic(topic))),
        Some(topic) => Err(ParseError::UnresolvedReference {
            document: document.to_string(),
            agent: agent.to_string(),
            topic,
        }),
    }
}

#[cfg(test)]
mod tests;
