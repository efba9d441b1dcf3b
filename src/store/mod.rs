//! Application store.
//!
//! Persists the logical application (never the execution plan) together
//! with its code archive id. Secrets are kept apart from the application in
//! a confidential resource owned by the application's parent resource.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::compute::kubernetes::resources::{canonical_bytes, labels, owner_reference};
use crate::compute::kubernetes::{ensure_not_deleting, KubernetesRuntimeConfig};
use crate::compute::{ClusterClient, ClusterError, ClusterResource, ComputeError, ResourceKind};
use crate::model::{Application, Secrets};

/// Secret key holding the application's secrets.
pub const SECRETS_KEY: &str = "secrets";

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by application stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored application {0} is corrupt: {1}")]
    Corrupt(String, String),
}

/// An application as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredApplication {
    pub application_id: String,
    pub tenant: String,
    pub application: Application,
    pub code_archive_id: Option<String>,
    /// Deletion was requested and is pending.
    pub marked_for_deletion: bool,
}

/// Persistence of logical applications per tenant.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Store or replace an application. Fails while a previous deletion of
    /// the same application is pending.
    async fn put(
        &self,
        tenant: &str,
        application_id: &str,
        application: &Application,
        code_archive_id: Option<&str>,
    ) -> Result<()>;

    async fn get(&self, tenant: &str, application_id: &str) -> Result<Option<StoredApplication>>;

    async fn list(&self, tenant: &str) -> Result<BTreeMap<String, StoredApplication>>;

    /// Request deletion. Owned resources are removed by the platform.
    async fn delete(&self, tenant: &str, application_id: &str) -> Result<()>;

    async fn on_tenant_created(&self, tenant: &str) -> Result<()>;

    async fn on_tenant_deleted(&self, tenant: &str) -> Result<()>;
}

/// Spec of the `Application` custom resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationResourceSpec {
    pub tenant: String,
    pub image: String,
    pub image_pull_policy: String,
    /// Serialized application, secrets excluded.
    pub application: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_archive_id: Option<String>,
}

/// Store backed by `Application` custom resources.
pub struct KubernetesApplicationStore {
    client: Arc<dyn ClusterClient>,
    config: KubernetesRuntimeConfig,
}

impl KubernetesApplicationStore {
    pub fn new(client: Arc<dyn ClusterClient>, config: KubernetesRuntimeConfig) -> Self {
        Self { client, config }
    }

    async fn load(&self, namespace: &str, resource: ClusterResource) -> Result<StoredApplication> {
        let corrupt = |reason: String| StoreError::Corrupt(resource.name.clone(), reason);
        let spec: ApplicationResourceSpec = resource
            .field("/spec")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| corrupt("missing spec".to_string()))?;
        let mut application: Application = serde_json::from_str(&spec.application)?;

        let secret = self
            .client
            .get(namespace, ResourceKind::Secret, &resource.name)
            .await?;
        if let Some(encoded) = secret.as_ref().and_then(|s| s.secret_data(SECRETS_KEY)) {
            let bytes = STANDARD
                .decode(encoded)
                .map_err(|e| corrupt(e.to_string()))?;
            application.secrets = serde_json::from_slice::<Secrets>(&bytes)?;
        }

        Ok(StoredApplication {
            application_id: resource.name.clone(),
            tenant: spec.tenant,
            application,
            code_archive_id: spec.code_archive_id,
            marked_for_deletion: resource.deletion_requested,
        })
    }
}

#[async_trait]
impl ApplicationStore for KubernetesApplicationStore {
    async fn put(
        &self,
        tenant: &str,
        application_id: &str,
        application: &Application,
        code_archive_id: Option<&str>,
    ) -> Result<()> {
        let namespace = self.config.namespace(tenant);
        ensure_not_deleting(self.client.as_ref(), &namespace, application_id).await?;

        let serialized = canonical_bytes(&application.without_secrets())?;
        let spec = ApplicationResourceSpec {
            tenant: tenant.to_string(),
            image: self.config.image.clone(),
            image_pull_policy: self.config.image_pull_policy.clone(),
            application: String::from_utf8_lossy(&serialized).into_owned(),
            code_archive_id: code_archive_id.map(str::to_string),
        };
        let resource = ClusterResource::new(
            ResourceKind::Application,
            application_id,
            serde_json::json!({ "spec": serde_json::to_value(&spec)? }),
        )
        .with_labels(labels(tenant, application_id, None));
        let stored = self.client.apply(&namespace, &resource).await?;
        info!(
            tenant = %tenant,
            namespace = %namespace,
            application_id = %application_id,
            "Stored application"
        );

        let secrets = serde_json::to_vec(&application.secrets)?;
        let secret = ClusterResource::new(
            ResourceKind::Secret,
            application_id,
            serde_json::json!({
                "type": "Opaque",
                "data": { SECRETS_KEY: STANDARD.encode(secrets) },
            }),
        )
        .with_labels(labels(tenant, application_id, None))
        .with_owner(owner_reference(&stored));
        self.client.apply(&namespace, &secret).await?;
        info!(
            tenant = %tenant,
            application_id = %application_id,
            "Stored application secrets"
        );
        Ok(())
    }

    async fn get(&self, tenant: &str, application_id: &str) -> Result<Option<StoredApplication>> {
        let namespace = self.config.namespace(tenant);
        match self
            .client
            .get(&namespace, ResourceKind::Application, application_id)
            .await?
        {
            Some(resource) => Ok(Some(self.load(&namespace, resource).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self, tenant: &str) -> Result<BTreeMap<String, StoredApplication>> {
        let namespace = self.config.namespace(tenant);
        let mut applications = BTreeMap::new();
        for resource in self
            .client
            .list(&namespace, ResourceKind::Application)
            .await?
        {
            let stored = self.load(&namespace, resource).await?;
            applications.insert(stored.application_id.clone(), stored);
        }
        Ok(applications)
    }

    async fn delete(&self, tenant: &str, application_id: &str) -> Result<()> {
        let namespace = self.config.namespace(tenant);
        let existed = self
            .client
            .delete(&namespace, ResourceKind::Application, application_id)
            .await?;
        info!(
            tenant = %tenant,
            application_id = %application_id,
            existed,
            "Requested application deletion"
        );
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

#[cfg(test)]
mod tests;
