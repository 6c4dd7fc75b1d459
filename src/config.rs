use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::rotation::{RecordTemplate, RotationSettings};

/// Configuration file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "credential-rotator.toml";

/// Main configuration structure for the credential rotator
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RotatorConfig {
    /// Credential issuer endpoints and key parameters
    pub issuer: IssuerConfig,
    /// Shape of the secret handed to consumers
    pub credential_record: CredentialRecordConfig,
    pub workload: WorkloadConfig,
    /// Controller loop settings
    pub controller: ControllerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// IAM endpoint exchanging API keys for bearer tokens
    pub iam_url: String,
    /// Resource controller endpoint managing resource keys
    pub resource_controller_url: String,
    /// Role granted to new resource keys
    pub key_role: String,
    /// Prefix of generated resource key names
    pub key_name_prefix: String,
    pub request_timeout_seconds: u64,
    /// Outbound request budget shared by all sessions
    pub requests_per_second: u32,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            iam_url: "https://iam.cloud.ibm.com".to_string(),
            resource_controller_url: "https://resource-controller.cloud.ibm.com".to_string(),
            key_role: "Manager".to_string(),
            key_name_prefix: "creds_for_".to_string(),
            request_timeout_seconds: 30,
            requests_per_second: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialRecordConfig {
    pub secret_name: String,
    pub secret_type: String,
    /// Value of the `owner` label
    pub owner_label: String,
    /// Value of the `name` label
    pub name_label: String,
}

impl Default for CredentialRecordConfig {
    fn default() -> Self {
        Self {
            secret_name: "cloudant".to_string(),
            secret_type: "example/credential-rotator-controller".to_string(),
            owner_label: "credential-rotator-controller".to_string(),
            name_label: "cloudant".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Pod template label stamped to force a rolling restart
    pub restart_label: String,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            restart_label: "credentials-rotator-redeployed".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Watch a single namespace instead of the whole cluster
    pub namespace: Option<String>,
    /// Delay after a conflicting status write
    pub requeue_backoff_seconds: u64,
    /// Delay after a failed invocation
    pub error_backoff_seconds: u64,
    /// Delay after an invocation rejected the request spec
    pub invalid_request_backoff_seconds: u64,
    /// Reporting component written on events
    pub reporter: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            requeue_backoff_seconds: 5,
            error_backoff_seconds: 30,
            invalid_request_backoff_seconds: 300,
            reporter: "credential-rotator-controller".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level, overridden by `RUST_LOG`
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl RotatorConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (`path`, or credential-rotator.toml when present)
    /// 3. Environment variables (prefixed with CREDENTIAL_ROTATOR_, sections split by `__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = toml::to_string(&RotatorConfig::default())?;
        let mut builder =
            Config::builder().add_source(File::from_str(&defaults, FileFormat::Toml));

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).format(FileFormat::Toml));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder
                    .add_source(File::with_name(DEFAULT_CONFIG_FILE).format(FileFormat::Toml));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix("CREDENTIAL_ROTATOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to assemble configuration")?;
        let rotator_config: RotatorConfig = config
            .try_deserialize()
            .context("Failed to parse configuration")?;
        Ok(rotator_config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    /// Engine parameters derived from this configuration
    pub fn rotation_settings(&self) -> RotationSettings {
        RotationSettings {
            key_role: self.issuer.key_role.clone(),
            key_name_prefix: self.issuer.key_name_prefix.clone(),
            record: RecordTemplate {
                record_name: self.credential_record.secret_name.clone(),
                name_label: self.credential_record.name_label.clone(),
                owner_label: self.credential_record.owner_label.clone(),
            },
        }
    }
}
