//! GitHub org provider - reconciles Teams and Memberships against GitHub

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};

use github_org_provider::config::{
    BackoffConfig, ControllerConfig, DEFAULT_MAX_CONCURRENT_RECONCILES,
};
use github_org_provider::registry::{self, KINDS};
use github_org_provider::telemetry::{init_telemetry, LogFormat};
use github_org_provider::{DEFAULT_GITHUB_API_URL, FIELD_MANAGER};

/// Declarative management of GitHub organization Teams and Memberships
#[derive(Parser, Debug)]
#[command(name = "github-org-provider", version, about, long_about = None)]
struct Cli {
    /// Print CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Log line format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controllers (default mode)
    ///
    /// Installs the CRDs, then runs one controller per managed kind until
    /// SIGTERM or Ctrl-C.
    Controller(ControllerArgs),
}

/// Controller mode arguments
#[derive(Parser, Debug)]
struct ControllerArgs {
    /// GitHub REST endpoint used when a ProviderConfig sets no baseUrl
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_GITHUB_API_URL)]
    github_api_url: String,

    /// Deadline for each GitHub call, in seconds
    #[arg(long, env = "REMOTE_TIMEOUT_SECS", default_value = "30")]
    remote_timeout_secs: u64,

    /// Requeue interval for drift detection, in seconds
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "60")]
    poll_interval_secs: u64,

    /// Concurrent reconciles per kind
    #[arg(long, env = "MAX_CONCURRENT_RECONCILES", default_value_t = DEFAULT_MAX_CONCURRENT_RECONCILES)]
    max_concurrent_reconciles: u16,

    /// Skip installing CRDs on startup
    #[arg(long, env = "SKIP_CRD_INSTALL")]
    skip_crd_install: bool,
}

impl Default for ControllerArgs {
    fn default() -> Self {
        Self::parse_from(["controller"])
    }
}

impl ControllerArgs {
    fn config(&self) -> ControllerConfig {
        ControllerConfig {
            github_api_url: self.github_api_url.clone(),
            remote_timeout: Duration::from_secs(self.remote_timeout_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_concurrent_reconciles: self.max_concurrent_reconciles,
            backoff: BackoffConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("failed to install TLS crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let manifests = registry::crds()
            .iter()
            .map(serde_yaml::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{}", manifests.join("---\n"));
        return Ok(());
    }

    init_telemetry(cli.log_format)?;

    match cli.command {
        Some(Commands::Controller(args)) => run_controllers(args).await,
        None => run_controllers(ControllerArgs::default()).await,
    }
}

/// Run every registered controller until shutdown
async fn run_controllers(args: ControllerArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if !args.skip_crd_install {
        ensure_crds_installed(&client).await?;
    }

    let config = Arc::new(args.config());
    tracing::info!(
        github_api_url = %config.github_api_url,
        poll_interval_secs = config.poll_interval.as_secs(),
        kinds = KINDS.len(),
        "Starting controllers"
    );

    let controllers = KINDS
        .iter()
        .map(|registration| (registration.controller)(client.clone(), config.clone()));
    futures::future::join_all(controllers).await;

    tracing::info!("Controllers stopped");
    Ok(())
}

/// Install the provider's CRDs with server-side apply
///
/// Re-applied on every start so installed schemas track the binary.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in registry::crds() {
        let name = crd
            .metadata
            .name
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generated CRD has no name"))?;
        tracing::info!(crd = %name, "Installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install CRD {}: {}", name, e))?;
    }
    Ok(())
}
