//! Rendering of plan agents into Kubernetes resources.
//!
//! Resource names are a pure function of `(applicationId, agentId)` so that
//! deletion can recompute them without stored state.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::KubernetesRuntimeConfig;
use crate::compute::{ClusterResource, OwnerReference, ResourceKind, Result};
use crate::model::{ConfigMap, ResourcesSpec, StreamingCluster};
use crate::plan::{AgentNode, ComponentType, ExecutionPlan};
use crate::streaming::{StreamingClusterRuntime, StreamingError};

/// Group/version of the custom resources.
pub const API_GROUP: &str = "pipewright.io";
pub const API_GROUP_VERSION: &str = "v1alpha1";
pub const API_VERSION: &str = "pipewright.io/v1alpha1";

/// Secret key holding the serialized runtime pod configuration.
pub const APP_CONFIG_KEY: &str = "app-config";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "pipewright";
pub const TENANT_LABEL: &str = "pipewright.io/tenant";
pub const APPLICATION_LABEL: &str = "pipewright.io/application";
pub const AGENT_LABEL: &str = "pipewright.io/agent";

/// Kubernetes object names are limited to this many characters.
const MAX_NAME_LEN: usize = 63;

/// Namespace holding every resource of a tenant.
pub fn tenant_namespace(prefix: &str, tenant: &str) -> String {
    format!("{prefix}{tenant}")
}

/// Name shared by an agent's workload resource and its secret.
///
/// A readable, sanitized `<applicationId>-<agentId>` prefix followed by a
/// short digest of the id pair, so two applications of a tenant never share
/// a name even when their ids join to the same text.
pub fn agent_resource_name(application_id: &str, agent_id: &str) -> String {
    let digest = hex::encode(Sha256::digest(
        format!("{application_id}\0{agent_id}").as_bytes(),
    ));
    let suffix = &digest[..8];
    let sanitized: String = format!("{application_id}-{agent_id}")
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let keep = sanitized.len().min(MAX_NAME_LEN - suffix.len() - 1);
    let prefix = sanitized[..keep].trim_matches('-');
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{prefix}-{suffix}")
    }
}

pub fn labels(tenant: &str, application_id: &str, agent_id: Option<&str>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        (TENANT_LABEL.to_string(), tenant.to_string()),
        (APPLICATION_LABEL.to_string(), application_id.to_string()),
    ]);
    if let Some(agent_id) = agent_id {
        labels.insert(AGENT_LABEL.to_string(), agent_id.to_string());
    }
    labels
}

/// Agent identity and configuration as seen by the workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeAgentSpec {
    pub component_type: ComponentType,
    pub tenant: String,
    pub agent_id: String,
    pub application_id: String,
    pub agent_type: String,
    pub configuration: ConfigMap,
}

/// Everything an agent workload needs at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimePodConfiguration {
    pub input_configuration: ConfigMap,
    pub output_configuration: ConfigMap,
    pub agent_spec: RuntimeAgentSpec,
    pub streaming_cluster: StreamingCluster,
}

/// Spec of the `Agent` custom resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResourceSpec {
    pub tenant: String,
    pub application_id: String,
    pub agent_id: String,
    pub image: String,
    pub image_pull_policy: String,
    pub resources: ResourcesSpec,
    pub agent_config_secret_ref: String,
    pub agent_config_secret_ref_checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_archive_id: Option<String>,
}

/// Rendered resources of one agent.
#[derive(Debug, Clone)]
pub struct AgentResources {
    pub secret: ClusterResource,
    pub agent: ClusterResource,
    pub checksum: String,
}

/// Recursively sort object keys.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serialize with stable key ordering.
pub fn canonical_bytes<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&canonicalize(&serde_json::to_value(value)?))
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Assemble the runtime configuration of one agent.
pub fn pod_configuration(
    tenant: &str,
    plan: &ExecutionPlan,
    agent: &AgentNode,
    streaming: &dyn StreamingClusterRuntime,
) -> Result<RuntimePodConfiguration> {
    let cluster = plan
        .streaming_cluster()
        .ok_or(StreamingError::MissingStreamingCluster)?;

    let mut configuration = agent.configuration.clone();
    configuration.insert("agentId".to_string(), Value::from(agent.id.clone()));
    configuration.insert("agentType".to_string(), Value::from(agent.agent_type.clone()));
    if let Some(metadata) = &agent.custom_metadata {
        configuration.insert("metadata".to_string(), serde_json::to_value(metadata)?);
    }

    let input_configuration = agent
        .input
        .as_ref()
        .map(|t| streaming.create_consumer_configuration(&plan.application_id, agent, t))
        .unwrap_or_default();
    let output_configuration = agent
        .output
        .as_ref()
        .map(|t| streaming.create_producer_configuration(&plan.application_id, agent, t))
        .unwrap_or_default();

    Ok(RuntimePodConfiguration {
        input_configuration,
        output_configuration,
        agent_spec: RuntimeAgentSpec {
            component_type: agent.component_type,
            tenant: tenant.to_string(),
            agent_id: agent.id.clone(),
            application_id: plan.application_id.clone(),
            agent_type: agent.agent_type.clone(),
            configuration,
        },
        streaming_cluster: cluster.clone(),
    })
}

/// Render the secret and workload resource of one agent.
pub fn agent_resources(
    config: &KubernetesRuntimeConfig,
    tenant: &str,
    plan: &ExecutionPlan,
    agent: &AgentNode,
    streaming: &dyn StreamingClusterRuntime,
    code_archive_id: Option<&str>,
    owner: Option<OwnerReference>,
) -> Result<AgentResources> {
    let pod_config = pod_configuration(tenant, plan, agent, streaming)?;
    let bytes = canonical_bytes(&pod_config)?;
    let checksum = checksum(&bytes);
    let name = agent_resource_name(&plan.application_id, &agent.id);
    let labels = labels(tenant, &plan.application_id, Some(&agent.id));

    let secret = ClusterResource::new(
        ResourceKind::Secret,
        &name,
        serde_json::json!({
            "type": "Opaque",
            "data": { APP_CONFIG_KEY: STANDARD.encode(&bytes) },
        }),
    )
    .with_labels(labels.clone())
    .with_owner(owner.clone());

    let spec = AgentResourceSpec {
        tenant: tenant.to_string(),
        application_id: plan.application_id.clone(),
        agent_id: agent.id.clone(),
        image: config.image.clone(),
        image_pull_policy: config.image_pull_policy.clone(),
        resources: agent.resources,
        agent_config_secret_ref: name.clone(),
        agent_config_secret_ref_checksum: checksum.clone(),
        code_archive_id: code_archive_id.map(str::to_string),
    };
    let agent = ClusterResource::new(
        ResourceKind::Agent,
        &name,
        serde_json::json!({ "spec": serde_json::to_value(&spec)? }),
    )
    .with_labels(labels)
    .with_owner(owner);

    Ok(AgentResources {
        secret,
        agent,
        checksum,
    })
}

/// Owner reference pointing at a stored custom resource.
pub fn owner_reference(resource: &ClusterResource) -> Option<OwnerReference> {
    resource.uid.as_ref().map(|uid| OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: resource.kind.kind().to_string(),
        name: resource.name.clone(),
        uid: uid.clone(),
        controller: true,
        block_owner_deletion: true,
    })
}

/// Decode the runtime pod configuration stored in an agent secret.
pub fn decode_pod_configuration(secret: &ClusterResource) -> Option<RuntimePodConfiguration> {
    let encoded = secret.secret_data(APP_CONFIG_KEY)?;
    let bytes = STANDARD.decode(encoded).ok()?;
    serde_json::from_slice(&bytes).ok()
}
