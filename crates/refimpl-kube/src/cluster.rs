//! Cluster lifecycle: creation plans, bootstrap install and teardown

use kube::Client;
use refimpl_core::{CoreError, Settings};
use std::cell::Cell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{KubeError, Result};
use crate::readiness::{
    ARGOCD_NAMESPACE, ApplicationSource, KubeApplicationSource, ReadinessConfig, ReadinessWaiter,
    poll,
};
use crate::resources::{OperationSummary, ResourceManager};

/// Default directory holding the cluster creation artifacts
pub const DEFAULT_CLUSTER_DIR: &str = "cluster";

/// Default directory holding the bootstrap manifests
pub const DEFAULT_BOOTSTRAP_DIR: &str = "bootstrap";

/// CRD groups removed by `crd-uninstall` unless configured otherwise
pub const DEFAULT_CRD_GROUPS: &[&str] = &[
    "argoproj.io",
    "external-secrets.io",
    "cert-manager.io",
    "crossplane.io",
    "pkg.crossplane.io",
    "keycloak.org",
];

/// Provisioning tool for `create-cluster`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterTool {
    Eksctl,
    Terraform,
}

impl FromStr for ClusterTool {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eksctl" => Ok(Self::Eksctl),
            "terraform" => Ok(Self::Terraform),
            other => Err(format!(
                "unknown cluster tool '{}' (expected eksctl or terraform)",
                other
            )),
        }
    }
}

impl fmt::Display for ClusterTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eksctl => write!(f, "eksctl"),
            Self::Terraform => write!(f, "terraform"),
        }
    }
}

/// Node management mode of the new cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterMode {
    /// EKS Auto Mode
    Auto,
    /// Self-managed node groups
    ManagedNodeGroups,
}

impl ClusterMode {
    /// Mode implied by the `auto_mode` config key
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.auto_mode {
            Self::Auto
        } else {
            Self::ManagedNodeGroups
        }
    }
}

impl FromStr for ClusterMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "auto-mode" => Ok(Self::Auto),
            "managed" | "managed-node-groups" => Ok(Self::ManagedNodeGroups),
            other => Err(format!(
                "unknown cluster mode '{}' (expected auto or managed-node-groups)",
                other
            )),
        }
    }
}

impl fmt::Display for ClusterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::ManagedNodeGroups => write!(f, "managed-node-groups"),
        }
    }
}

/// What `create-cluster` will run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPlan {
    pub tool: ClusterTool,
    pub mode: ClusterMode,
    pub cluster_name: String,
    pub region: String,
    /// Directory holding `eksctl/` and `terraform/`
    pub base_dir: PathBuf,
}

impl ClusterPlan {
    pub fn new(settings: &Settings, tool: ClusterTool, mode: ClusterMode) -> Self {
        Self {
            tool,
            mode,
            cluster_name: settings.cluster_name.clone(),
            region: settings.region.clone(),
            base_dir: PathBuf::from(DEFAULT_CLUSTER_DIR),
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Config file (eksctl) or module directory (terraform) to use
    pub fn artifact(&self) -> PathBuf {
        match (self.tool, self.mode) {
            (ClusterTool::Eksctl, ClusterMode::Auto) => {
                self.base_dir.join("eksctl").join("cluster-config-auto.yaml")
            }
            (ClusterTool::Eksctl, ClusterMode::ManagedNodeGroups) => {
                self.base_dir.join("eksctl").join("cluster-config.yaml")
            }
            (ClusterTool::Terraform, ClusterMode::Auto) => {
                self.base_dir.join("terraform").join("auto-mode")
            }
            (ClusterTool::Terraform, ClusterMode::ManagedNodeGroups) => {
                self.base_dir.join("terraform").join("managed-node-groups")
            }
        }
    }

    /// Commands to run, in order
    pub fn commands(&self) -> Vec<CommandSpec> {
        let artifact = self.artifact().display().to_string();
        match self.tool {
            ClusterTool::Eksctl => vec![
                CommandSpec::new("eksctl")
                    .args(["create", "cluster", "-f", &artifact])
                    .interactive(),
            ],
            ClusterTool::Terraform => {
                let chdir = format!("-chdir={}", artifact);
                vec![
                    CommandSpec::new("terraform")
                        .args([chdir.as_str(), "init"])
                        .interactive(),
                    CommandSpec::new("terraform")
                        .args([chdir.as_str(), "apply", "-auto-approve", "-var"])
                        .arg(format!("cluster_name={}", self.cluster_name))
                        .arg("-var")
                        .arg(format!("region={}", self.region))
                        .interactive(),
                ]
            }
        }
    }

    /// Check the artifact exists, then run every command
    pub async fn execute<R: CommandRunner>(&self, runner: &R) -> Result<()> {
        let artifact = self.artifact();
        let present = match self.tool {
            ClusterTool::Eksctl => artifact.is_file(),
            ClusterTool::Terraform => artifact.is_dir(),
        };
        if !present {
            return Err(CoreError::MissingFile {
                path: artifact.display().to_string(),
            }
            .into());
        }

        for spec in self.commands() {
            tracing::info!(command = %spec, "running");
            runner.run_checked(&spec).await?;
        }

        tracing::info!(cluster = %self.cluster_name, region = %self.region, "cluster created");
        Ok(())
    }
}

/// Outcome of waiting for applications to go away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// No applications remain
    Removed(usize),
    /// Gave up waiting; not an error
    TimedOut { remaining: usize },
}

/// Timing for application teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10 * 60),
            interval: Duration::from_secs(10),
        }
    }
}

/// Delete every application in `namespace`, then wait until none remain
pub async fn remove_applications<S: ApplicationSource>(
    source: &S,
    namespace: &str,
    config: TeardownConfig,
) -> Result<TeardownOutcome> {
    let apps = match source.list_applications(namespace).await {
        Ok(apps) => apps,
        // Argo CD already gone
        Err(e) if e.is_not_found() => Vec::new(),
        Err(e) => return Err(e),
    };
    let count = apps.len();
    for app in &apps {
        tracing::info!(namespace, application = %app.name, "deleting application");
        source.delete_application(namespace, &app.name).await?;
    }

    let remaining = Cell::new(count);
    let waited = poll(config.interval, Some(config.timeout), || {
        let remaining = &remaining;
        async move {
            match source.list_applications(namespace).await {
                Ok(apps) => {
                    remaining.set(apps.len());
                    apps.is_empty()
                }
                Err(e) => {
                    tracing::debug!(error = %e, "listing applications failed, retrying");
                    false
                }
            }
        }
    })
    .await;

    match waited {
        Ok(()) => Ok(TeardownOutcome::Removed(count)),
        Err(elapsed) => {
            let remaining = remaining.get();
            tracing::warn!(
                namespace,
                remaining,
                elapsed = ?elapsed,
                "applications still present, continuing"
            );
            Ok(TeardownOutcome::TimedOut { remaining })
        }
    }
}

/// Install, uninstall and CRD cleanup against one cluster
pub struct Bootstrapper {
    client: Client,
    namespace: String,
}

impl Bootstrapper {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            namespace: ARGOCD_NAMESPACE.to_string(),
        }
    }

    /// Apply the bootstrap manifests, then wait for readiness
    pub async fn install(
        &self,
        manifest_dir: &Path,
        readiness: ReadinessConfig,
    ) -> Result<OperationSummary> {
        let mut manager = ResourceManager::new(self.client.clone()).await?;
        let summary = manager.apply_directory(&self.namespace, manifest_dir).await?;
        tracing::info!(summary = %summary.summary(), "bootstrap manifests applied");

        if !summary.is_success() {
            return Err(KubeError::ApplyFailed {
                summary: summary.summary(),
                details: summary
                    .failed
                    .iter()
                    .map(|(name, err)| format!("{}: {}", name, err))
                    .collect::<Vec<_>>()
                    .join("; "),
            });
        }

        let source = KubeApplicationSource::new(self.client.clone());
        ReadinessWaiter::new(&source, readiness).wait_all().await?;
        Ok(summary)
    }

    /// Delete every Argo CD application and wait for them to go away
    pub async fn uninstall(&self, config: TeardownConfig) -> Result<TeardownOutcome> {
        let source = KubeApplicationSource::new(self.client.clone());
        remove_applications(&source, &self.namespace, config).await
    }

    /// Delete the CRDs of the given API groups
    pub async fn uninstall_crds(&self, groups: &[String]) -> Result<OperationSummary> {
        let manager = ResourceManager::new(self.client.clone()).await?;
        manager.delete_crds(groups).await
    }
}

/// [`DEFAULT_CRD_GROUPS`] as owned strings
pub fn default_crd_groups() -> Vec<String> {
    DEFAULT_CRD_GROUPS.iter().map(|g| g.to_string()).collect()
}
