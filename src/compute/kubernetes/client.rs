//! kube-rs backed control-plane client.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    ObjectMeta, OwnerReference as KubeOwnerReference,
};
use kube::{
    api::{
        Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch,
        PatchParams,
    },
    Client,
};
use tracing::debug;

use super::resources::{API_GROUP, API_GROUP_VERSION};
use crate::compute::cluster::Result;
use crate::compute::{ClusterClient, ClusterResource, OwnerReference, ResourceKind};

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

/// Control-plane client talking to the Kubernetes API server.
pub struct KubeClusterClient {
    client: Client,
    field_manager: String,
}

impl KubeClusterClient {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    /// Client from the in-cluster or kubeconfig environment.
    pub async fn try_default(field_manager: impl Into<String>) -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client, field_manager))
    }

    fn api_resource(kind: ResourceKind) -> ApiResource {
        match kind {
            ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
            ResourceKind::Agent => ApiResource::from_gvk_with_plural(
                &GroupVersionKind::gvk(API_GROUP, API_GROUP_VERSION, kind.kind()),
                "agents",
            ),
            ResourceKind::Application => ApiResource::from_gvk_with_plural(
                &GroupVersionKind::gvk(API_GROUP, API_GROUP_VERSION, kind.kind()),
                "applications",
            ),
        }
    }

    fn api(&self, namespace: &str, kind: ResourceKind) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &Self::api_resource(kind))
    }

    fn apply_params(&self) -> PatchParams {
        PatchParams::apply(&self.field_manager).force()
    }

    fn to_dynamic(namespace: &str, resource: &ClusterResource) -> DynamicObject {
        let mut object =
            DynamicObject::new(&resource.name, &Self::api_resource(resource.kind)).within(namespace);
        if !resource.labels.is_empty() {
            object.metadata.labels = Some(resource.labels.clone());
        }
        if !resource.finalizers.is_empty() {
            object.metadata.finalizers = Some(resource.finalizers.clone());
        }
        object.metadata.owner_references = resource.owner.as_ref().map(|owner| {
            vec![KubeOwnerReference {
                api_version: owner.api_version.clone(),
                kind: owner.kind.clone(),
                name: owner.name.clone(),
                uid: owner.uid.clone(),
                controller: Some(owner.controller),
                block_owner_deletion: Some(owner.block_owner_deletion),
            }]
        });
        object.data = resource.body.clone();
        object
    }

    fn from_dynamic(kind: ResourceKind, object: DynamicObject) -> ClusterResource {
        let metadata = object.metadata;
        let owner = metadata
            .owner_references
            .and_then(|refs| refs.into_iter().next())
            .map(|r| OwnerReference {
                api_version: r.api_version,
                kind: r.kind,
                name: r.name,
                uid: r.uid,
                controller: r.controller.unwrap_or_default(),
                block_owner_deletion: r.block_owner_deletion.unwrap_or_default(),
            });

        ClusterResource {
            kind,
            name: metadata.name.unwrap_or_default(),
            labels: metadata.labels.unwrap_or_default(),
            owner,
            finalizers: metadata.finalizers.unwrap_or_default(),
            deletion_requested: metadata.deletion_timestamp.is_some(),
            uid: metadata.uid,
            body: object.data,
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn apply(&self, namespace: &str, resource: &ClusterResource) -> Result<ClusterResource> {
        let object = Self::to_dynamic(namespace, resource);
        debug!(namespace = %namespace, kind = %resource.kind, name = %resource.name, "Applying");
        let stored = self
            .api(namespace, resource.kind)
            .patch(&resource.name, &self.apply_params(), &Patch::Apply(&object))
            .await?;
        Ok(Self::from_dynamic(resource.kind, stored))
    }

    async fn get(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ClusterResource>> {
        let object = self.api(namespace, kind).get_opt(name).await?;
        Ok(object.map(|o| Self::from_dynamic(kind, o)))
    }

    async fn list(&self, namespace: &str, kind: ResourceKind) -> Result<Vec<ClusterResource>> {
        let objects = self
            .api(namespace, kind)
            .list(&ListParams::default())
            .await?;
        Ok(objects
            .items
            .into_iter()
            .map(|o| Self::from_dynamic(kind, o))
            .collect())
    }

    async fn delete(&self, namespace: &str, kind: ResourceKind, name: &str) -> Result<bool> {
        match self
            .api(namespace, kind)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_namespace(&self, namespace: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let object = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        namespaces
            .patch(namespace, &self.apply_params(), &Patch::Apply(&object))
            .await?;
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        match namespaces.delete(namespace, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
