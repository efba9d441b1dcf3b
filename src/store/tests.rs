use std::sync::Arc;

use super::*;
use crate::compute::InMemoryCluster;
use crate::model::{ConfigMap, Secret};

const NAMESPACE: &str = "pw-t1";

fn setup() -> (InMemoryCluster, KubernetesApplicationStore) {
    let cluster = InMemoryCluster::new();
    let config = KubernetesRuntimeConfig {
        namespace_prefix: "pw-".to_string(),
        image: "busybox".to_string(),
        ..Default::default()
    };
    let store = KubernetesApplicationStore::new(Arc::new(cluster.clone()), config);
    (cluster, store)
}

fn application_with_secret() -> Application {
    let mut app = Application::new();
    app.secrets.put(Secret {
        id: "mysecret".to_string(),
        name: Some("My secret".to_string()),
        data: ConfigMap::from([("token".to_string(), serde_json::json!("xxx"))]),
    });
    app
}

#[tokio::test]
async fn test_put_stores_application_and_secret() {
    let (cluster, store) = setup();
    store.on_tenant_created("t1").await.unwrap();

    store
        .put("t1", "test", &application_with_secret(), Some("archive-1"))
        .await
        .unwrap();

    let resource = cluster
        .get(NAMESPACE, ResourceKind::Application, "test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resource.field("/spec/tenant"), Some(&serde_json::json!("t1")));
    assert_eq!(resource.field("/spec/image"), Some(&serde_json::json!("busybox")));
    assert_eq!(
        resource.field("/spec/application"),
        Some(&serde_json::json!(r#"{"instance":null,"modules":{},"resources":{}}"#))
    );
    assert_eq!(
        resource.field("/spec/codeArchiveId"),
        Some(&serde_json::json!("archive-1"))
    );

    let secret = cluster
        .get(NAMESPACE, ResourceKind::Secret, "test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        secret.secret_data(SECRETS_KEY),
        Some(
            "eyJzZWNyZXRzIjp7Im15c2VjcmV0Ijp7ImlkIjoibXlzZWNyZXQiLCJuYW1lIjoiTXkgc2VjcmV0IiwiZGF0YSI6eyJ0b2tlbiI6Inh4eCJ9fX19"
        )
    );
    let owner = secret.owner.unwrap();
    assert_eq!(owner.kind, "Application");
    assert_eq!(owner.name, "test");
    assert_eq!(Some(owner.uid), resource.uid);
    assert!(owner.controller);
    assert!(owner.block_owner_deletion);
}

#[tokio::test]
async fn test_get_restores_secrets() {
    let (_, store) = setup();
    store.on_tenant_created("t1").await.unwrap();
    let app = application_with_secret();
    store.put("t1", "test", &app, None).await.unwrap();

    let stored = store.get("t1", "test").await.unwrap().unwrap();
    assert_eq!(stored.application, app);
    assert_eq!(stored.tenant, "t1");
    assert_eq!(stored.code_archive_id, None);
    assert!(!stored.marked_for_deletion);

    assert!(store.get("t1", "missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_returns_tenant_applications() {
    let (_, store) = setup();
    store.on_tenant_created("t1").await.unwrap();
    store.on_tenant_created("t2").await.unwrap();
    store.put("t1", "a", &Application::new(), None).await.unwrap();
    store.put("t1", "b", &Application::new(), None).await.unwrap();
    store.put("t2", "c", &Application::new(), None).await.unwrap();

    let listed = store.list("t1").await.unwrap();
    assert_eq!(listed.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(store.list("t2").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_put_rejected_while_deletion_is_pending() {
    let (cluster, store) = setup();
    store.on_tenant_created("t1").await.unwrap();
    store.put("t1", "test", &Application::new(), None).await.unwrap();
    cluster
        .set_finalizers(
            NAMESPACE,
            ResourceKind::Application,
            "test",
            vec!["cleanup".to_string()],
        )
        .await;
    store.delete("t1", "test").await.unwrap();

    let stored = store.get("t1", "test").await.unwrap().unwrap();
    assert!(stored.marked_for_deletion);

    let err = store
        .put("t1", "test", &Application::new(), None)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Application test is marked for deletion. Please retry once the application is deleted."
    );

    cluster
        .set_finalizers(NAMESPACE, ResourceKind::Application, "test", Vec::new())
        .await;
    assert!(store.get("t1", "test").await.unwrap().is_none());
    store.put("t1", "test", &Application::new(), None).await.unwrap();
}

#[tokio::test]
async fn test_delete_cascades_to_secret() {
    let (cluster, store) = setup();
    store.on_tenant_created("t1").await.unwrap();
    store
        .put("t1", "test", &application_with_secret(), None)
        .await
        .unwrap();

    store.delete("t1", "test").await.unwrap();
    assert!(cluster
        .get(NAMESPACE, ResourceKind::Secret, "test")
        .await
        .unwrap()
        .is_none());
    store.delete("t1", "test").await.unwrap();
}

#[tokio::test]
async fn test_tenant_deleted_marks_namespace() {
    let (cluster, store) = setup();
    store.on_tenant_created("t1").await.unwrap();
    assert!(cluster.namespace_exists(NAMESPACE).await);

    store.on_tenant_deleted("t1").await.unwrap();
    assert!(cluster.is_terminating(NAMESPACE).await);
    let err = store
        .put("t1", "test", &Application::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Compute(ComputeError::Cluster(ClusterError::NamespaceTerminating(_)))
            | StoreError::Cluster(ClusterError::NamespaceTerminating(_))
    ));
}
