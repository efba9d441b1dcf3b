//! pipewright-deployer: one-shot deploy/delete job
//!
//! Builds the application from its document directories, compiles the
//! execution plan and reconciles it onto the broker and the cluster.
//!
//! ## Configuration
//! - PIPEWRIGHT_APP_DIRS: comma-separated document directories
//! - PIPEWRIGHT_TENANT: owning tenant
//! - PIPEWRIGHT_APPLICATION_ID: application id
//! - PIPEWRIGHT_CODE_ARCHIVE_ID: code archive to run (optional)
//! - PIPEWRIGHT_MODE: `deploy` (default) or `delete`
//! - PIPEWRIGHT_CONFIG / PIPEWRIGHT__KUBERNETES__*: runtime settings

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use pipewright::agents::AgentProviderRegistry;
use pipewright::compute::{ClusterClient, KubeClusterClient};
use pipewright::config::{
    Config, APPLICATION_ID_ENV_VAR, APP_DIRS_ENV_VAR, CODE_ARCHIVE_ID_ENV_VAR, MODE_ENV_VAR,
    TENANT_ENV_VAR,
};
use pipewright::deployer::{ApplicationDeployer, ClusterRuntimeRegistry};
use pipewright::parser::ModelBuilder;
use pipewright::store::{ApplicationStore, KubernetesApplicationStore};
use pipewright::utils::bootstrap::{connect_backoff, connect_with_retry, init_tracing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Deploy,
    Delete,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deploy" => Ok(Mode::Deploy),
            "delete" => Ok(Mode::Delete),
            other => Err(format!("{MODE_ENV_VAR} must be deploy or delete, got '{other}'")),
        }
    }
}

struct Job {
    app_dirs: Vec<PathBuf>,
    tenant: String,
    application_id: String,
    code_archive_id: Option<String>,
    mode: Mode,
}

fn required(name: &str) -> Result<String, String> {
    std::env::var(name).map_err(|_| format!("{name} is required"))
}

impl Job {
    fn from_env() -> Result<Self, String> {
        let app_dirs = required(APP_DIRS_ENV_VAR)?
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .collect();
        let mode = match std::env::var(MODE_ENV_VAR) {
            Ok(value) => value.parse()?,
            Err(_) => Mode::Deploy,
        };
        Ok(Self {
            app_dirs,
            tenant: required(TENANT_ENV_VAR)?,
            application_id: required(APPLICATION_ID_ENV_VAR)?,
            code_archive_id: std::env::var(CODE_ARCHIVE_ID_ENV_VAR).ok(),
            mode,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;
    let job = Job::from_env()?;
    info!(
        tenant = %job.tenant,
        application_id = %job.application_id,
        mode = ?job.mode,
        "pipewright-deployer started"
    );

    let field_manager = config.kubernetes.field_manager.clone();
    let client = connect_with_retry("kubernetes", connect_backoff(), || {
        KubeClusterClient::try_default(field_manager.clone())
    })
    .await?;
    let client: Arc<dyn ClusterClient> = Arc::new(client);

    let deployer = ApplicationDeployer::new(
        ClusterRuntimeRegistry::with_defaults(client.clone(), config.kubernetes.clone()),
        AgentProviderRegistry::with_defaults(),
    );
    let store = KubernetesApplicationStore::new(client, config.kubernetes.clone());

    let application = ModelBuilder::build_from_directories(job.app_dirs.as_slice())?;
    let plan = deployer.create_execution_plan(&job.application_id, &application)?;

    match job.mode {
        Mode::Deploy => {
            store
                .put(
                    &job.tenant,
                    &job.application_id,
                    &application,
                    job.code_archive_id.as_deref(),
                )
                .await?;
            deployer
                .deploy(&job.tenant, &plan, job.code_archive_id.as_deref())
                .await?;
        }
        Mode::Delete => {
            deployer.delete(&job.tenant, &plan).await?;
            store.delete(&job.tenant, &job.application_id).await?;
        }
    }

    info!(application_id = %job.application_id, "pipewright-deployer finished");
    Ok(())
}
