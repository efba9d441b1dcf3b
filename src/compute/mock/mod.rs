//! In-memory control plane for testing.
//!
//! Models the platform behaviours the runtimes depend on: namespaces must
//! exist, terminating namespaces reject writes, finalizers hold a deletion
//! pending, and removing an owner cascades to the resources it owns.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::compute::cluster::Result;
use crate::compute::{ClusterClient, ClusterError, ClusterResource, ResourceKind};

type Key = (ResourceKind, String);

#[derive(Default)]
struct Namespace {
    terminating: bool,
    objects: BTreeMap<Key, ClusterResource>,
}

#[derive(Default)]
struct State {
    namespaces: BTreeMap<String, Namespace>,
    next_uid: u64,
    applies: usize,
}

/// Control plane backed by in-memory maps. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryCluster {
    state: Arc<RwLock<State>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn namespace_exists(&self, namespace: &str) -> bool {
        self.state.read().await.namespaces.contains_key(namespace)
    }

    pub async fn is_terminating(&self, namespace: &str) -> bool {
        self.state
            .read()
            .await
            .namespaces
            .get(namespace)
            .is_some_and(|ns| ns.terminating)
    }

    /// Complete a pending namespace deletion, dropping all its content.
    pub async fn finish_namespace_deletion(&self, namespace: &str) {
        let mut state = self.state.write().await;
        if state
            .namespaces
            .get(namespace)
            .is_some_and(|ns| ns.terminating)
        {
            state.namespaces.remove(namespace);
        }
    }

    /// Replace a resource's finalizers. Clearing them completes a pending
    /// deletion.
    pub async fn set_finalizers(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
        finalizers: Vec<String>,
    ) {
        let mut state = self.state.write().await;
        let Some(ns) = state.namespaces.get_mut(namespace) else {
            return;
        };
        let key = (kind, name.to_string());
        let Some(object) = ns.objects.get_mut(&key) else {
            return;
        };
        object.finalizers = finalizers;
        if object.deletion_requested && object.finalizers.is_empty() {
            remove_with_cascade(ns, &key);
        }
    }

    /// Number of apply calls served.
    pub async fn apply_count(&self) -> usize {
        self.state.read().await.applies
    }

    /// Names of all resources of a kind in a namespace.
    pub async fn names(&self, namespace: &str, kind: ResourceKind) -> Vec<String> {
        self.state
            .read()
            .await
            .namespaces
            .get(namespace)
            .map(|ns| {
                ns.objects
                    .keys()
                    .filter(|(k, _)| *k == kind)
                    .map(|(_, name)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Remove an object and everything it owns, honouring finalizers on owned
/// objects.
fn remove_with_cascade(ns: &mut Namespace, key: &Key) {
    let Some(removed) = ns.objects.remove(key) else {
        return;
    };
    let Some(uid) = removed.uid else {
        return;
    };
    let owned: Vec<Key> = ns
        .objects
        .iter()
        .filter(|(_, o)| o.owner.as_ref().is_some_and(|r| r.uid == uid))
        .map(|(k, _)| k.clone())
        .collect();
    for key in owned {
        request_deletion(ns, &key);
    }
}

fn request_deletion(ns: &mut Namespace, key: &Key) -> bool {
    let Some(object) = ns.objects.get_mut(key) else {
        return false;
    };
    if object.finalizers.is_empty() {
        remove_with_cascade(ns, key);
    } else {
        object.deletion_requested = true;
    }
    true
}

fn writable<'a>(state: &'a mut State, namespace: &str) -> Result<&'a mut Namespace> {
    match state.namespaces.get_mut(namespace) {
        None => Err(ClusterError::NamespaceNotFound(namespace.to_string())),
        Some(ns) if ns.terminating => Err(ClusterError::NamespaceTerminating(namespace.to_string())),
        Some(ns) => Ok(ns),
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn apply(&self, namespace: &str, resource: &ClusterResource) -> Result<ClusterResource> {
        let mut state = self.state.write().await;
        state.applies += 1;
        state.next_uid += 1;
        let uid = format!("uid-{}", state.next_uid);
        let ns = writable(&mut *state, namespace)?;

        let key = (resource.kind, resource.name.clone());
        let stored = match ns.objects.get(&key) {
            Some(existing) => ClusterResource {
                uid: existing.uid.clone(),
                deletion_requested: existing.deletion_requested,
                finalizers: if resource.finalizers.is_empty() {
                    existing.finalizers.clone()
                } else {
                    resource.finalizers.clone()
                },
                ..resource.clone()
            },
            None => ClusterResource {
                uid: Some(uid),
                deletion_requested: false,
                ..resource.clone()
            },
        };
        ns.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ClusterResource>> {
        Ok(self
            .state
            .read()
            .await
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.objects.get(&(kind, name.to_string())))
            .cloned())
    }

    async fn list(&self, namespace: &str, kind: ResourceKind) -> Result<Vec<ClusterResource>> {
        Ok(self
            .state
            .read()
            .await
            .namespaces
            .get(namespace)
            .map(|ns| {
                ns.objects
                    .iter()
                    .filter(|((k, _), _)| *k == kind)
                    .map(|(_, o)| o.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, namespace: &str, kind: ResourceKind, name: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(ns) = state.namespaces.get_mut(namespace) else {
            return Ok(false);
        };
        Ok(request_deletion(ns, &(kind, name.to_string())))
    }

    async fn create_namespace(&self, namespace: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let ns = state.namespaces.entry(namespace.to_string()).or_default();
        if ns.terminating {
            return Err(ClusterError::NamespaceTerminating(namespace.to_string()));
        }
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        if let Some(ns) = self.state.write().await.namespaces.get_mut(namespace) {
            ns.terminating = true;
        }
        Ok(())
    }
}
