use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};
use std::path::PathBuf;
use std::sync::Arc;

use credential_rotator::{
    build_reconciler, init_telemetry, kubernetes, shutdown_telemetry, CredentialRotator, ObjectKey,
    RotationMetrics, RotatorConfig,
};

#[derive(Parser)]
#[command(name = "credential-rotator")]
#[command(version)]
#[command(about = "Crash-safe rotation of IBM Cloud service credentials stored in Kubernetes secrets")]
#[command(long_about = "Watches CredentialRotator resources and walks each one through \
                       PENDING, CREATING, NOTIFYING, DELETING and DONE: a new resource key is \
                       minted, written to the consumer's secret, the consumer deployment is \
                       restarted and the replaced key is deleted.")]
struct Cli {
    /// Configuration file (defaults to credential-rotator.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller until interrupted
    Run {
        /// Only watch rotators in this namespace
        #[arg(long, help = "Restrict the controller to one namespace")]
        namespace: Option<String>,
    },
    /// Perform a single reconcile step for one rotator and print the outcome
    Reconcile {
        /// Namespace of the CredentialRotator
        namespace: String,
        /// Name of the CredentialRotator
        name: String,
    },
    /// Print the CredentialRotator CustomResourceDefinition as JSON
    Crd,
    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crd => crd_command(),
        Commands::Config => {
            let config = load_config(cli.config.as_deref())?;
            config_command(&config)
        }
        Commands::Run { namespace } => {
            let mut config = load_config(cli.config.as_deref())?;
            if namespace.is_some() {
                config.controller.namespace = namespace;
            }
            init_telemetry(&config.observability)?;
            tokio::runtime::Runtime::new()?.block_on(async { run_command(&config).await })
        }
        Commands::Reconcile { namespace, name } => {
            let config = load_config(cli.config.as_deref())?;
            init_telemetry(&config.observability)?;
            tokio::runtime::Runtime::new()?.block_on(async {
                reconcile_command(&config, ObjectKey::new(namespace, name)).await
            })
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<RotatorConfig> {
    RotatorConfig::load_env_file()?;
    RotatorConfig::load(path).context("Failed to load configuration")
}

fn crd_command() -> Result<()> {
    let crd = serde_json::to_string_pretty(&CredentialRotator::crd())?;
    println!("{crd}");
    Ok(())
}

fn config_command(config: &RotatorConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

async fn run_command(config: &RotatorConfig) -> Result<()> {
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let metrics = Arc::new(RotationMetrics::new());

    let result = kubernetes::run(client, config, metrics).await;
    shutdown_telemetry();
    result
}

async fn reconcile_command(config: &RotatorConfig, key: ObjectKey) -> Result<()> {
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let reconciler = build_reconciler(client, config)?;

    let action = reconciler
        .reconcile(&key)
        .await
        .with_context(|| format!("Reconcile of {key} failed"))?;
    println!("{key}: {action:?}");

    reconciler.metrics().log_stats();
    shutdown_telemetry();
    Ok(())
}
