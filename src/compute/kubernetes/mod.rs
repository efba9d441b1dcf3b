//! Kubernetes compute runtime.
//!
//! Every agent becomes a configuration `Secret` plus an `Agent` custom
//! resource, both applied with server-side apply in the tenant namespace
//! `<prefix><tenant>`. An operator watching `Agent` resources turns them
//! into workloads; it is not part of this crate.

#[cfg(feature = "k8s")]
mod client;
pub mod resources;

#[cfg(feature = "k8s")]
pub use client::KubeClusterClient;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    ClusterClient, ClusterResource, ComputeClusterRuntime, ComputeError, ResourceKind, Result,
    KUBERNETES_CLUSTER_TYPE,
};
use crate::plan::ExecutionPlan;
use crate::streaming::StreamingClusterRuntime;

/// Static deployer-side settings; never taken from pipeline documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesRuntimeConfig {
    pub namespace_prefix: String,
    /// Agent runtime container image.
    pub image: String,
    pub image_pull_policy: String,
    /// Field manager name used for server-side apply.
    pub field_manager: String,
}

impl Default for KubernetesRuntimeConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: "pipewright-".to_string(),
            image: "ghcr.io/pipewright/runtime:latest".to_string(),
            image_pull_policy: "IfNotPresent".to_string(),
            field_manager: "pipewright".to_string(),
        }
    }
}

impl KubernetesRuntimeConfig {
    pub fn namespace(&self, tenant: &str) -> String {
        resources::tenant_namespace(&self.namespace_prefix, tenant)
    }
}

/// Fail when the application's parent resource is pending deletion.
///
/// Returns the parent resource when it exists. This is a read-then-act check:
/// a deletion requested after the read is not detected.
pub async fn ensure_not_deleting(
    client: &dyn ClusterClient,
    namespace: &str,
    application_id: &str,
) -> Result<Option<ClusterResource>> {
    let parent = client
        .get(namespace, ResourceKind::Application, application_id)
        .await?;
    match parent {
        Some(parent) if parent.deletion_requested => {
            warn!(
                namespace = %namespace,
                application_id = %application_id,
                "Application is marked for deletion, rejecting"
            );
            Err(ComputeError::ApplicationMarkedForDeletion(
                application_id.to_string(),
            ))
        }
        parent => Ok(parent),
    }
}

/// Kubernetes implementation of [`ComputeClusterRuntime`].
pub struct KubernetesClusterRuntime {
    client: Arc<dyn ClusterClient>,
    config: KubernetesRuntimeConfig,
}

impl KubernetesClusterRuntime {
    pub fn new(client: Arc<dyn ClusterClient>, config: KubernetesRuntimeConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &KubernetesRuntimeConfig {
        &self.config
    }
}

#[async_trait]
impl ComputeClusterRuntime for KubernetesClusterRuntime {
    fn cluster_type(&self) -> &str {
        KUBERNETES_CLUSTER_TYPE
    }

    async fn deploy(
        &self,
        tenant: &str,
        plan: &ExecutionPlan,
        streaming: &dyn StreamingClusterRuntime,
        code_archive_id: Option<&str>,
    ) -> Result<()> {
        let namespace = self.config.namespace(tenant);
        let parent =
            ensure_not_deleting(self.client.as_ref(), &namespace, &plan.application_id).await?;
        let owner = parent.as_ref().and_then(resources::owner_reference);

        streaming.deploy(plan).await?;

        let mut rendered = Vec::with_capacity(plan.agents.len());
        for agent in plan.agents.values() {
            rendered.push(resources::agent_resources(
                &self.config,
                tenant,
                plan,
                agent,
                streaming,
                code_archive_id,
                owner.clone(),
            )?);
        }

        for unit in &rendered {
            self.client.apply(&namespace, &unit.secret).await?;
            info!(
                tenant = %tenant,
                namespace = %namespace,
                secret = %unit.secret.name,
                "Applied agent secret"
            );
        }
        for unit in &rendered {
            self.client.apply(&namespace, &unit.agent).await?;
            info!(
                tenant = %tenant,
                namespace = %namespace,
                agent = %unit.agent.name,
                checksum = %unit.checksum,
                "Applied agent resource"
            );
        }
        Ok(())
    }

    async fn delete(&self, tenant: &str, plan: &ExecutionPlan) -> Result<()> {
        let namespace = self.config.namespace(tenant);
        for agent in plan.agents.values() {
            let name = resources::agent_resource_name(&plan.application_id, &agent.id);
            for kind in [ResourceKind::Agent, ResourceKind::Secret] {
                if self.client.delete(&namespace, kind, &name).await? {
                    info!(namespace = %namespace, kind = %kind, name = %name, "Deleted resource");
                } else {
                    info!(
                        namespace = %namespace,
                        kind = %kind,
                        name = %name,
                        "Resource didn't exist, not a problem"
                    );
                }
            }
        }
        Ok(())
    }

    async fn on_tenant_created(&self, tenant: &str) -> Result<()> {
        let namespace = self.config.namespace(tenant);
        self.client.create_namespace(&namespace).await?;
        info!(tenant = %tenant, namespace = %namespace, "Provisioned tenant namespace");
        Ok(())
    }

    async fn on_tenant_deleted(&self, tenant: &str) -> Result<()> {
        let namespace = self.config.namespace(tenant);
        self.client.delete_namespace(&namespace).await?;
        info!(tenant = %tenant, namespace = %namespace, "Marked tenant namespace for deletion");
        Ok(())
    }
}
