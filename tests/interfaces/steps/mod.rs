//! Cucumber step definitions for interface tests.

pub mod application_store;
pub mod deploy_lifecycle;

use std::collections::BTreeMap;
use std::fmt;

use cucumber::World;
use pipewright::compute::{ClusterClient, ResourceKind};
use pipewright::model::Application;

use crate::backend::{DeployContext, StreamingBackend};

/// Shared scenario state.
#[derive(World)]
#[world(init = Self::new)]
pub struct DeployWorld {
    backend: StreamingBackend,
    context: Option<DeployContext>,
    application_id: String,
    application: Option<Application>,
    /// Agent checksums observed after each deploy, oldest first.
    checksums: Vec<BTreeMap<String, String>>,
    last_error: Option<String>,
}

impl fmt::Debug for DeployWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployWorld")
            .field("backend", &self.backend)
            .field("application_id", &self.application_id)
            .field("deploys", &self.checksums.len())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl DeployWorld {
    fn new() -> Self {
        Self {
            backend: StreamingBackend::from_env(),
            context: None,
            application_id: String::new(),
            application: None,
            checksums: Vec::new(),
            last_error: None,
        }
    }

    fn ctx(&self) -> &DeployContext {
        self.context.as_ref().expect("Deploy context not initialized")
    }

    fn application(&self) -> &Application {
        self.application.as_ref().expect("No application declared")
    }

    fn namespace(&self, tenant: &str) -> String {
        self.ctx().config.namespace(tenant)
    }

    async fn agent_checksums(&self, tenant: &str) -> BTreeMap<String, String> {
        let namespace = self.namespace(tenant);
        let mut checksums = BTreeMap::new();
        for agent in self
            .ctx()
            .cluster
            .list(&namespace, ResourceKind::Agent)
            .await
            .expect("list agents")
        {
            let checksum = agent
                .field("/spec/agentConfigSecretRefChecksum")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            checksums.insert(agent.name.clone(), checksum);
        }
        checksums
    }
}
