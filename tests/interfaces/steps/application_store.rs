//! ApplicationStore step definitions.

use cucumber::{given, then, when};
use pipewright::compute::{ClusterClient, ResourceKind};
use pipewright::model::{ConfigMap, Secret};
use pipewright::store::ApplicationStore;

use super::DeployWorld;

#[given(expr = "the application has secret {string} with value {string}")]
async fn given_secret(world: &mut DeployWorld, id: String, value: String) {
    let application = world.application.as_mut().expect("No application declared");
    application.secrets.put(Secret {
        id,
        name: None,
        data: ConfigMap::from([("value".to_string(), serde_json::Value::from(value))]),
    });
}

#[given(expr = "the application is stored for tenant {string}")]
async fn given_stored(world: &mut DeployWorld, tenant: String) {
    store_application(world, &tenant).await;
}

#[when(expr = "the application is stored for tenant {string}")]
async fn when_stored(world: &mut DeployWorld, tenant: String) {
    store_application(world, &tenant).await;
}

async fn store_application(world: &DeployWorld, tenant: &str) {
    world
        .ctx()
        .store
        .put(
            tenant,
            &world.application_id,
            world.application(),
            Some("archive-1"),
        )
        .await
        .expect("store application");
}

#[when(expr = "tenant {string} is deleted")]
async fn when_tenant_deleted(world: &mut DeployWorld, tenant: String) {
    world
        .ctx()
        .store
        .on_tenant_deleted(&tenant)
        .await
        .expect("delete tenant");
}

#[then(expr = "the stored application spec of tenant {string} does not contain {string}")]
async fn then_spec_excludes(world: &mut DeployWorld, tenant: String, needle: String) {
    let namespace = world.namespace(&tenant);
    let resource = world
        .ctx()
        .cluster
        .get(&namespace, ResourceKind::Application, &world.application_id)
        .await
        .expect("get application")
        .expect("application stored");
    let serialized = resource
        .field("/spec/application")
        .and_then(|v| v.as_str())
        .expect("serialized application");
    assert!(!serialized.contains(&needle), "{serialized}");
}

#[then(expr = "reading the application back for tenant {string} restores secret {string} with value {string}")]
async fn then_secret_restored(world: &mut DeployWorld, tenant: String, id: String, value: String) {
    let stored = world
        .ctx()
        .store
        .get(&tenant, &world.application_id)
        .await
        .expect("get application")
        .expect("application stored");
    let secret = stored.application.secrets.get(&id).expect("secret restored");
    assert_eq!(secret.data["value"], serde_json::Value::from(value));
    assert_eq!(stored.code_archive_id.as_deref(), Some("archive-1"));
    assert_eq!(&stored.application, world.application());
}

#[then(expr = "tenant {string} lists {int} application(s)")]
async fn then_list_count(world: &mut DeployWorld, tenant: String, count: usize) {
    let listed = world.ctx().store.list(&tenant).await.expect("list");
    assert_eq!(listed.len(), count, "{:?}", listed.keys().collect::<Vec<_>>());
}

#[then(expr = "the stored application of tenant {string} is marked for deletion")]
async fn then_marked(world: &mut DeployWorld, tenant: String) {
    let stored = world
        .ctx()
        .store
        .get(&tenant, &world.application_id)
        .await
        .expect("get application")
        .expect("application stored");
    assert!(stored.marked_for_deletion);
}
