//! Deploy lifecycle step definitions.

use cucumber::{given, then, when};
use pipewright::compute::kubernetes::resources::agent_resource_name;
use pipewright::compute::{ClusterClient, ResourceKind};
use pipewright::parser::ModelBuilder;
use pipewright::store::ApplicationStore;

use super::DeployWorld;
use crate::backend::DeployContext;

const PIPELINE: &str = r#"
id: main
topics:
  - name: input-topic
    creation-mode: create-if-not-exists
  - name: output-topic
    creation-mode: create-if-not-exists
pipeline:
  - id: extract
    type: text-extractor
    input: input-topic
  - id: store
    type: python-sink
    output: output-topic
    configuration:
      className: example.Store
"#;

// --- Background ---

#[given("a deployer on in-memory backends")]
async fn given_deployer(world: &mut DeployWorld) {
    println!("Using streaming backend: {}", world.backend.name());
    world.context = Some(DeployContext::new(world.backend));
}

#[given(expr = "tenant {string} exists")]
async fn given_tenant(world: &mut DeployWorld, tenant: String) {
    let namespace = world.namespace(&tenant);
    world
        .ctx()
        .cluster
        .create_namespace(&namespace)
        .await
        .expect("create namespace");
}

// --- Given steps ---

#[given(expr = "the application {string} with a two-agent pipeline")]
async fn given_application(world: &mut DeployWorld, application_id: String) {
    let instance = format!(
        "instance:\n  streamingCluster:\n    type: {}\n  computeCluster:\n    type: kubernetes\n",
        world.backend.name()
    );
    let application = ModelBuilder::build([
        ("pipeline.yaml", PIPELINE),
        ("instance.yaml", instance.as_str()),
    ])
    .expect("valid documents");
    world.application_id = application_id;
    world.application = Some(application);
}

#[given(expr = "the stored application of tenant {string} has a pending finalizer")]
async fn given_pending_finalizer(world: &mut DeployWorld, tenant: String) {
    let namespace = world.namespace(&tenant);
    world
        .ctx()
        .cluster
        .set_finalizers(
            &namespace,
            ResourceKind::Application,
            &world.application_id,
            vec!["pipewright.io/cleanup".to_string()],
        )
        .await;
}

// --- When steps ---

#[when(expr = "the application is deployed for tenant {string}")]
async fn when_deployed(world: &mut DeployWorld, tenant: String) {
    let deployer = &world.ctx().deployer;
    let result = match deployer.create_execution_plan(&world.application_id, world.application()) {
        Ok(plan) => deployer.deploy(&tenant, &plan, Some("archive-1")).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            world.last_error = None;
            let checksums = world.agent_checksums(&tenant).await;
            world.checksums.push(checksums);
        }
        Err(e) => world.last_error = Some(e.to_string()),
    }
}

#[when(expr = "the application is deleted for tenant {string}")]
async fn when_deleted(world: &mut DeployWorld, tenant: String) {
    let deployer = &world.ctx().deployer;
    let plan = deployer
        .create_execution_plan(&world.application_id, world.application())
        .expect("plan");
    world.last_error = deployer.delete(&tenant, &plan).await.err().map(|e| e.to_string());
}

#[when(expr = "the stored application is deleted for tenant {string}")]
async fn when_stored_deleted(world: &mut DeployWorld, tenant: String) {
    world
        .ctx()
        .store
        .delete(&tenant, &world.application_id)
        .await
        .expect("delete stored application");
}

#[when(expr = "agent {string} configuration {string} is set to {string}")]
async fn when_configuration_changed(
    world: &mut DeployWorld,
    agent_id: String,
    key: String,
    value: String,
) {
    let application = world.application.as_mut().expect("No application declared");
    let agent = application
        .modules
        .values_mut()
        .flat_map(|m| m.pipelines.values_mut())
        .find_map(|p| p.agent_mut(&agent_id))
        .expect("agent declared");
    agent
        .configuration
        .insert(key, serde_json::Value::from(value));
}

// --- Then steps ---

#[then(expr = "tenant {string} has {int} agent resources")]
async fn then_agent_count(world: &mut DeployWorld, tenant: String, count: usize) {
    let namespace = world.namespace(&tenant);
    let agents = world.ctx().cluster.names(&namespace, ResourceKind::Agent).await;
    let secrets = world.ctx().cluster.names(&namespace, ResourceKind::Secret).await;
    assert_eq!(agents.len(), count, "agents in {namespace}: {agents:?}");
    let agent_secrets = secrets.iter().filter(|s| agents.contains(s)).count();
    assert_eq!(agent_secrets, count, "every agent has its secret");
}

#[then("each topic was created once")]
async fn then_topics_created_once(world: &mut DeployWorld) {
    let plan = world
        .ctx()
        .deployer
        .create_execution_plan(&world.application_id, world.application())
        .expect("plan");
    let admin = &world.ctx().admin;
    assert_eq!(admin.create_calls().await, plan.topics.len());
    for name in plan.topics.keys() {
        assert!(admin.has_topic(name).await, "missing topic {name}");
    }
}

#[then("agent checksums are unchanged since the first deploy")]
async fn then_checksums_unchanged(world: &mut DeployWorld) {
    let first = world.checksums.first().expect("at least one deploy");
    let last = world.checksums.last().expect("at least one deploy");
    assert!(!first.is_empty());
    assert_eq!(first, last);
}

#[then(expr = "the checksum of agent {string} changed")]
async fn then_checksum_changed(world: &mut DeployWorld, agent_id: String) {
    let (before, after) = checksum_pair(world, &agent_id);
    assert_ne!(before, after);
}

#[then(expr = "the checksum of agent {string} is unchanged")]
async fn then_checksum_unchanged(world: &mut DeployWorld, agent_id: String) {
    let (before, after) = checksum_pair(world, &agent_id);
    assert_eq!(before, after);
}

#[then(expr = "the deploy fails with {string}")]
async fn then_deploy_fails(world: &mut DeployWorld, message: String) {
    assert_eq!(world.last_error.as_deref(), Some(message.as_str()));
}

#[then("the operation succeeds")]
async fn then_succeeds(world: &mut DeployWorld) {
    assert_eq!(world.last_error, None);
}

#[then("no topics remain")]
async fn then_no_topics(world: &mut DeployWorld) {
    assert!(world.ctx().admin.topic_names().await.is_empty());
}

#[then(expr = "namespace of tenant {string} is terminating")]
async fn then_namespace_terminating(world: &mut DeployWorld, tenant: String) {
    let namespace = world.namespace(&tenant);
    assert!(world.ctx().cluster.is_terminating(&namespace).await);
}

fn checksum_pair(world: &DeployWorld, agent_id: &str) -> (String, String) {
    let name = agent_resource_name(&world.application_id, agent_id);
    let first = world.checksums.first().expect("at least one deploy");
    let last = world.checksums.last().expect("at least one deploy");
    (
        first.get(&name).cloned().expect("agent deployed first"),
        last.get(&name).cloned().expect("agent deployed last"),
    )
}
