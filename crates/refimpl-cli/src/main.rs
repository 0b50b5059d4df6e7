//! Refimpl CLI - bootstrapper for the CNOE reference implementation on AWS

use clap::{Parser, ValueEnum};
use refimpl_kube::{ClusterMode, ClusterTool, DEFAULT_BOOTSTRAP_DIR, DEFAULT_CLUSTER_DIR};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod display;
mod error;
mod exit_codes;

use error::CliError;

#[derive(Parser)]
#[command(name = "refimpl")]
#[command(version)]
#[command(
    about = "Create, bootstrap and tear down the CNOE reference implementation on AWS",
    long_about = None
)]
pub struct Cli {
    /// Phase to run
    #[arg(value_enum, env = "PHASE")]
    phase: Phase,

    /// Configuration file
    #[arg(long, env = "CONFIG_FILE", default_value = "config.yaml")]
    config: PathBuf,

    /// Directory holding one GitHub App YAML file per app
    #[arg(long, env = "PRIVATE_DIR", default_value = "private")]
    private_dir: PathBuf,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long, env = "ASSUME_YES")]
    yes: bool,

    /// Cluster provisioning tool for create-cluster (eksctl or terraform)
    #[arg(long)]
    tool: Option<ClusterTool>,

    /// Cluster mode for create-cluster (auto or managed-node-groups)
    #[arg(long)]
    mode: Option<ClusterMode>,

    /// Directory holding the eksctl and terraform artifacts
    #[arg(long, default_value = DEFAULT_CLUSTER_DIR)]
    cluster_dir: PathBuf,

    /// Directory holding the bootstrap manifests applied by install
    #[arg(long, default_value = DEFAULT_BOOTSTRAP_DIR)]
    bootstrap_dir: PathBuf,

    /// API group whose CRDs crd-uninstall removes (repeatable)
    #[arg(long = "crd-group")]
    crd_groups: Vec<String>,

    /// Enable debug output
    #[arg(long)]
    debug: bool,
}

/// Phases of the reference implementation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Phase {
    /// Provision the EKS cluster
    CreateCluster,
    /// Apply the bootstrap manifests and wait for every application
    Install,
    /// Delete every Argo CD application
    Uninstall,
    /// Delete the CRDs left behind by the addons
    CrdUninstall,
    /// Write the GitHub App and config secrets
    CreateUpdateSecrets,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::CreateCluster => "create-cluster",
            Phase::Install => "install",
            Phase::Uninstall => "uninstall",
            Phase::CrdUninstall => "crd-uninstall",
            Phase::CreateUpdateSecrets => "create-update-secrets",
        }
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_tracing(cli.debug);

    let result = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::internal(format!("failed to start async runtime: {}", e)))
        .and_then(|runtime| runtime.block_on(commands::run(&cli)));

    match result {
        Ok(()) => std::process::exit(exit_codes::SUCCESS),
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{:?}", miette::Report::new(e));
            std::process::exit(code);
        }
    }
}
