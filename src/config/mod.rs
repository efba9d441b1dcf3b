//! Deployer configuration.
//!
//! Static, deployer-side settings loaded from YAML files and environment
//! variables. Nothing here comes from pipeline documents.

use serde::Deserialize;

use crate::compute::KubernetesRuntimeConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "PIPEWRIGHT_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "PIPEWRIGHT";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "PIPEWRIGHT_LOG";

/// Deployer job inputs.
pub const APP_DIRS_ENV_VAR: &str = "PIPEWRIGHT_APP_DIRS";
pub const TENANT_ENV_VAR: &str = "PIPEWRIGHT_TENANT";
pub const APPLICATION_ID_ENV_VAR: &str = "PIPEWRIGHT_APPLICATION_ID";
pub const CODE_ARCHIVE_ID_ENV_VAR: &str = "PIPEWRIGHT_CODE_ARCHIVE_ID";
pub const MODE_ENV_VAR: &str = "PIPEWRIGHT_MODE";

/// Main deployer configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Kubernetes compute runtime and application store settings.
    pub kubernetes: KubernetesRuntimeConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `PIPEWRIGHT_CONFIG` (if set)
    /// 4. `PIPEWRIGHT__SECTION__KEY` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_load_defaults_without_sources() {
        std::env::remove_var(CONFIG_ENV_VAR);
        let config = Config::load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.kubernetes.namespace_prefix, "pipewright-");
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        std::env::remove_var(CONFIG_ENV_VAR);
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "kubernetes:\n  image: registry.local/runtime:1.2\n  namespace_prefix: tenant-"
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.kubernetes.image, "registry.local/runtime:1.2");
        assert_eq!(config.kubernetes.namespace("a"), "tenant-a");
        assert_eq!(config.kubernetes.image_pull_policy, "IfNotPresent");
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "kubernetes:\n  image_pull_policy: Never").unwrap();
        std::env::set_var(CONFIG_ENV_VAR, file.path());
        std::env::set_var("PIPEWRIGHT__KUBERNETES__IMAGE_PULL_POLICY", "Always");

        let config = Config::load(None);

        std::env::remove_var(CONFIG_ENV_VAR);
        std::env::remove_var("PIPEWRIGHT__KUBERNETES__IMAGE_PULL_POLICY");
        assert_eq!(config.unwrap().kubernetes.image_pull_policy, "Always");
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_fails() {
        std::env::remove_var(CONFIG_ENV_VAR);
        assert!(Config::load(Some("/nonexistent/pipewright.yaml")).is_err());
    }
}
