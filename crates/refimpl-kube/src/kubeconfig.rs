//! Kubeconfig acquisition
//!
//! Exactly one strategy is used per run:
//! - **LocalFile**: k0s controller on this machine, read its admin kubeconfig
//! - **RemoteFetch**: k0s controller elsewhere, `ssh` in and read the same file
//! - **ManagedService**: EKS, have `aws eks update-kubeconfig` generate one
//!
//! Generated or fetched credentials live in a private temporary directory
//! owned by the returned [`KubeconfigHandle`] and disappear when it drops.

use kube::config::{KubeConfigOptions, Kubeconfig};
use refimpl_core::{Distro, Settings};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{KubeError, Result};

/// Admin kubeconfig written by the k0s controller
pub const K0S_ADMIN_KUBECONFIG: &str = "/var/lib/k0s/pki/admin.conf";

const KUBECONFIG_FILE: &str = "kubeconfig";

/// How the kubeconfig for this run is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KubeconfigStrategy {
    /// Read the k0s admin kubeconfig on this machine
    LocalFile,
    /// Read the k0s admin kubeconfig on a remote controller over ssh
    RemoteFetch {
        host: String,
        user: String,
        key: Option<PathBuf>,
    },
    /// Generate a kubeconfig for an EKS cluster
    ManagedService { cluster: String, region: String },
}

impl KubeconfigStrategy {
    /// Pick the strategy from the distro and host settings alone
    pub fn select(settings: &Settings, local_hostname: &str) -> Self {
        match settings.distro {
            Distro::Eks => Self::ManagedService {
                cluster: settings.cluster_name.clone(),
                region: settings.region.clone(),
            },
            Distro::K0s => {
                let k0s = &settings.k0s;
                match k0s.host() {
                    _ if k0s.use_local => Self::LocalFile,
                    None => Self::LocalFile,
                    Some(host) if is_local_host(host, local_hostname) => Self::LocalFile,
                    Some(host) => Self::RemoteFetch {
                        host: host.to_string(),
                        user: k0s.ssh_user.clone(),
                        key: k0s.ssh_key_path.clone(),
                    },
                }
            }
        }
    }

    /// Short label for log lines
    pub fn label(&self) -> &'static str {
        match self {
            Self::LocalFile => "local k0s kubeconfig",
            Self::RemoteFetch { .. } => "remote k0s kubeconfig over ssh",
            Self::ManagedService { .. } => "EKS generated kubeconfig",
        }
    }
}

/// Whether `host` names this machine (case-insensitive)
pub fn is_local_host(host: &str, local_hostname: &str) -> bool {
    let host = host.trim().to_ascii_lowercase();
    let short = short_hostname(local_hostname);
    host == "localhost" || host == "127.0.0.1" || (!short.is_empty() && host == short)
}

fn short_hostname(name: &str) -> String {
    name.trim()
        .split('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Short hostname of this machine, empty if it cannot be determined
pub fn current_hostname() -> String {
    hostname::get()
        .map(|h| short_hostname(&h.to_string_lossy()))
        .unwrap_or_default()
}

/// The active kubeconfig for a run
///
/// Transient kubeconfigs are deleted when the handle drops.
#[derive(Debug)]
pub struct KubeconfigHandle {
    path: PathBuf,
    scratch: Option<TempDir>,
}

impl KubeconfigHandle {
    fn persistent(path: PathBuf) -> Self {
        Self {
            path,
            scratch: None,
        }
    }

    fn transient(content: &str) -> Result<Self> {
        let scratch = tempfile::Builder::new().prefix("refimpl-").tempdir()?;
        let path = scratch.path().join(KUBECONFIG_FILE);
        fs::write(&path, content)?;
        Ok(Self {
            path,
            scratch: Some(scratch),
        })
    }

    fn generated(scratch: TempDir, path: PathBuf) -> Self {
        Self {
            path,
            scratch: Some(scratch),
        }
    }

    /// Path of the kubeconfig file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file is removed when this handle drops
    pub fn is_transient(&self) -> bool {
        self.scratch.is_some()
    }

    /// Parse the kubeconfig
    pub fn kubeconfig(&self) -> Result<Kubeconfig> {
        Kubeconfig::read_from(&self.path).map_err(|e| KubeError::InvalidKubeconfig {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Build a Kubernetes client from the kubeconfig's current context
    pub async fn client(&self) -> Result<kube::Client> {
        let kubeconfig = self.kubeconfig()?;
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| KubeError::InvalidKubeconfig {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(kube::Client::try_from(config)?)
    }
}

/// Produces the kubeconfig for a run
pub struct KubeconfigProvider<'a, R: CommandRunner> {
    settings: &'a Settings,
    runner: &'a R,
    local_path: PathBuf,
    local_hostname: String,
}

impl<'a, R: CommandRunner> KubeconfigProvider<'a, R> {
    /// Create a provider for the given settings
    pub fn new(settings: &'a Settings, runner: &'a R) -> Self {
        Self {
            settings,
            runner,
            local_path: PathBuf::from(K0S_ADMIN_KUBECONFIG),
            local_hostname: current_hostname(),
        }
    }

    /// Read the local kubeconfig from another path
    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = path.into();
        self
    }

    /// Override the hostname used for host matching
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.local_hostname = hostname.into();
        self
    }

    /// The strategy this provider will use
    pub fn strategy(&self) -> KubeconfigStrategy {
        KubeconfigStrategy::select(self.settings, &self.local_hostname)
    }

    /// Obtain a validated kubeconfig
    pub async fn acquire(&self) -> Result<KubeconfigHandle> {
        let strategy = self.strategy();
        tracing::info!(strategy = strategy.label(), "acquiring kubeconfig");

        let handle = match &strategy {
            KubeconfigStrategy::LocalFile => self.read_local()?,
            KubeconfigStrategy::RemoteFetch { host, user, key } => {
                self.fetch_remote(host, user, key.as_deref()).await?
            }
            KubeconfigStrategy::ManagedService { cluster, region } => {
                self.generate(cluster, region).await?
            }
        };

        // The endpoint override belongs to the k0s settings
        match self.settings.k0s.endpoint() {
            Some(endpoint) if self.settings.distro == Distro::K0s => {
                Ok(override_endpoint(handle, endpoint))
            }
            _ => Ok(handle),
        }
    }

    fn read_local(&self) -> Result<KubeconfigHandle> {
        let path = &self.local_path;
        let content =
            fs::read_to_string(path).map_err(|e| KubeError::CredentialSourceUnavailable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        if content.trim().is_empty() {
            return Err(KubeError::CredentialSourceUnavailable {
                path: path.display().to_string(),
                reason: "file is empty".to_string(),
            });
        }

        Ok(KubeconfigHandle::persistent(path.clone()))
    }

    async fn fetch_remote(
        &self,
        host: &str,
        user: &str,
        key: Option<&Path>,
    ) -> Result<KubeconfigHandle> {
        let mut spec = CommandSpec::new("ssh").args([
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "ConnectTimeout=10",
        ]);
        if let Some(key) = key {
            spec = spec.arg("-i").arg(expand_home(key).display().to_string());
        }
        let spec = spec
            .arg(format!("{}@{}", user, host))
            .arg(format!("sudo cat {}", K0S_ADMIN_KUBECONFIG));

        tracing::info!(host, user, "fetching kubeconfig over ssh");
        let output = self.runner.run(&spec).await?;

        if !output.success() {
            return Err(KubeError::RemoteFetchFailed {
                host: host.to_string(),
                reason: format!("ssh exited with {}: {}", output.code, output.stderr.trim()),
            });
        }
        if output.stdout.trim().is_empty() {
            return Err(KubeError::RemoteFetchFailed {
                host: host.to_string(),
                reason: "empty kubeconfig".to_string(),
            });
        }

        KubeconfigHandle::transient(&output.stdout)
    }

    async fn generate(&self, cluster: &str, region: &str) -> Result<KubeconfigHandle> {
        let scratch = tempfile::Builder::new().prefix("refimpl-").tempdir()?;
        let path = scratch.path().join(KUBECONFIG_FILE);

        let spec = CommandSpec::new("aws").args([
            "eks",
            "update-kubeconfig",
            "--name",
            cluster,
            "--region",
            region,
            "--kubeconfig",
            &path.display().to_string(),
        ]);

        tracing::info!(cluster, region, "generating EKS kubeconfig");
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return Err(KubeError::GenerationFailed {
                message: format!(
                    "aws eks update-kubeconfig exited with {}: {}",
                    output.code,
                    output.stderr.trim()
                ),
            });
        }

        let written = fs::read_to_string(&path).unwrap_or_default();
        if written.trim().is_empty() {
            return Err(KubeError::GenerationFailed {
                message: format!("no kubeconfig was written for cluster '{}'", cluster),
            });
        }

        Ok(KubeconfigHandle::generated(scratch, path))
    }
}

/// Point every cluster entry at `endpoint`, keeping the original on failure
fn override_endpoint(handle: KubeconfigHandle, endpoint: &str) -> KubeconfigHandle {
    match rewrite_server(&handle, endpoint) {
        Ok(rewritten) => {
            tracing::info!(endpoint, "rewrote kubeconfig server address");
            rewritten
        }
        Err(e) => {
            tracing::warn!(endpoint, error = %e, "could not rewrite kubeconfig server address");
            handle
        }
    }
}

fn rewrite_server(handle: &KubeconfigHandle, endpoint: &str) -> Result<KubeconfigHandle> {
    let mut kubeconfig = handle.kubeconfig()?;
    if kubeconfig.clusters.is_empty() {
        return Err(KubeError::InvalidKubeconfig {
            path: handle.path().display().to_string(),
            message: "no clusters defined".to_string(),
        });
    }

    for named in &mut kubeconfig.clusters {
        if let Some(cluster) = named.cluster.as_mut() {
            cluster.server = Some(endpoint.to_string());
        }
    }

    let content = serde_yaml::to_string(&kubeconfig)?;
    KubeconfigHandle::transient(&content)
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandOutput, MockCommandRunner};

    const SAMPLE_KUBECONFIG: &str = r#"apiVersion: v1
kind: Config
clusters:
- name: k0s
  cluster:
    server: https://10.0.0.5:6443
    certificate-authority-data: Zm9v
contexts:
- name: k0s
  context:
    cluster: k0s
    user: admin
current-context: k0s
users:
- name: admin
  user:
    client-certificate-data: YmFy
    client-key-data: YmF6
"#;

    fn settings(extra: &str) -> Settings {
        Settings::from_yaml(&format!("cluster_name: demo\nregion: us-east-2\n{}", extra)).unwrap()
    }

    fn local_file(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("admin.conf");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_select_eks_by_default() {
        let s = settings("k0s:\n  control_plane_host: 10.0.0.5\n");
        assert_eq!(
            KubeconfigStrategy::select(&s, "box"),
            KubeconfigStrategy::ManagedService {
                cluster: "demo".to_string(),
                region: "us-east-2".to_string()
            }
        );
    }

    #[test]
    fn test_select_use_local_wins_over_host() {
        let s = settings(
            "k8s_distro: k0s\nk0s:\n  use_local: true\n  control_plane_host: far.away\n",
        );
        assert_eq!(KubeconfigStrategy::select(&s, "box"), KubeconfigStrategy::LocalFile);
    }

    #[test]
    fn test_select_no_host_is_local() {
        let s = settings("k8s_distro: k0s\n");
        assert_eq!(KubeconfigStrategy::select(&s, "box"), KubeconfigStrategy::LocalFile);
    }

    #[test]
    fn test_select_host_matching_is_case_insensitive() {
        let s = settings("k8s_distro: k0s\nk0s:\n  control_plane_host: MyHost\n");
        assert_eq!(KubeconfigStrategy::select(&s, "myhost"), KubeconfigStrategy::LocalFile);

        let s = settings("k8s_distro: k0s\nk0s:\n  control_plane_host: LOCALHOST\n");
        assert_eq!(KubeconfigStrategy::select(&s, "other"), KubeconfigStrategy::LocalFile);

        let s = settings("k8s_distro: k0s\nk0s:\n  control_plane_host: 127.0.0.1\n");
        assert_eq!(KubeconfigStrategy::select(&s, "other"), KubeconfigStrategy::LocalFile);
    }

    #[test]
    fn test_select_remote() {
        let s = settings(
            "k8s_distro: k0s\nk0s:\n  control_plane_host: 10.0.0.5\n  ssh_key_path: /keys/id\n",
        );
        assert_eq!(
            KubeconfigStrategy::select(&s, "box"),
            KubeconfigStrategy::RemoteFetch {
                host: "10.0.0.5".to_string(),
                user: "root".to_string(),
                key: Some(PathBuf::from("/keys/id")),
            }
        );
    }

    #[test]
    fn test_is_local_host_uses_short_hostname() {
        assert!(is_local_host("node1", "Node1.example.com"));
        assert!(!is_local_host("node2", "node1"));
        assert!(!is_local_host("node1", ""));
    }

    #[tokio::test]
    async fn test_local_file_returned_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(&dir, SAMPLE_KUBECONFIG);
        let s = settings("k8s_distro: k0s\nk0s:\n  use_local: true\n");
        let runner = MockCommandRunner::new();

        let handle = KubeconfigProvider::new(&s, &runner)
            .with_local_path(&path)
            .acquire()
            .await
            .unwrap();

        assert_eq!(handle.path(), path.as_path());
        assert!(!handle.is_transient());
        assert_eq!(fs::read_to_string(&path).unwrap(), SAMPLE_KUBECONFIG);
        assert!(runner.calls().is_empty());

        drop(handle);
        assert!(path.exists(), "persistent kubeconfig must not be deleted");
    }

    #[tokio::test]
    async fn test_local_file_missing() {
        let s = settings("k8s_distro: k0s\n");
        let runner = MockCommandRunner::new();

        let err = KubeconfigProvider::new(&s, &runner)
            .with_local_path("/nonexistent/admin.conf")
            .acquire()
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::CredentialSourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_local_file_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(&dir, "  \n");
        let s = settings("k8s_distro: k0s\n");
        let runner = MockCommandRunner::new();

        let err = KubeconfigProvider::new(&s, &runner)
            .with_local_path(&path)
            .acquire()
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::CredentialSourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_endpoint_override_rewrites_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(&dir, SAMPLE_KUBECONFIG);
        let s = settings(
            "k8s_distro: k0s\nk0s:\n  use_local: true\n  api_endpoint: https://203.0.113.7:6443\n",
        );
        let runner = MockCommandRunner::new();

        let handle = KubeconfigProvider::new(&s, &runner)
            .with_local_path(&path)
            .acquire()
            .await
            .unwrap();

        assert_ne!(handle.path(), path.as_path());
        assert!(handle.is_transient());
        let kc = handle.kubeconfig().unwrap();
        assert_eq!(
            kc.clusters[0].cluster.as_ref().unwrap().server.as_deref(),
            Some("https://203.0.113.7:6443")
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), SAMPLE_KUBECONFIG);
    }

    #[tokio::test]
    async fn test_endpoint_override_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(&dir, "not: [a kubeconfig\n");
        let s = settings(
            "k8s_distro: k0s\nk0s:\n  use_local: true\n  api_endpoint: https://203.0.113.7:6443\n",
        );
        let runner = MockCommandRunner::new();

        let handle = KubeconfigProvider::new(&s, &runner)
            .with_local_path(&path)
            .acquire()
            .await
            .unwrap();
        assert_eq!(handle.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_remote_fetch() {
        let s = settings(
            "k8s_distro: k0s\n\
             k0s:\n  control_plane_host: 10.0.0.5\n  ssh_user: ubuntu\n  ssh_key_path: /keys/id\n",
        );
        let runner = MockCommandRunner::new();
        runner.respond("ssh", CommandOutput::ok(SAMPLE_KUBECONFIG));

        let handle = KubeconfigProvider::new(&s, &runner)
            .with_hostname("workstation")
            .acquire()
            .await
            .unwrap();

        assert!(handle.is_transient());
        assert_eq!(fs::read_to_string(handle.path()).unwrap(), SAMPLE_KUBECONFIG);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert_eq!(calls[0].flag_value("-i"), Some("/keys/id"));
        assert!(calls[0].args.contains(&"ubuntu@10.0.0.5".to_string()));

        let path = handle.path().to_path_buf();
        drop(handle);
        assert!(!path.exists(), "transient kubeconfig must be removed");
    }

    #[tokio::test]
    async fn test_remote_fetch_empty_output() {
        let s = settings("k8s_distro: k0s\nk0s:\n  control_plane_host: 10.0.0.5\n");
        let runner = MockCommandRunner::new();
        runner.respond("ssh", CommandOutput::ok("\n"));

        let err = KubeconfigProvider::new(&s, &runner)
            .with_hostname("workstation")
            .acquire()
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::RemoteFetchFailed { ref host, .. } if host == "10.0.0.5"));
    }

    #[tokio::test]
    async fn test_remote_fetch_ssh_failure() {
        let s = settings("k8s_distro: k0s\nk0s:\n  control_plane_host: 10.0.0.5\n");
        let runner = MockCommandRunner::new();
        runner.respond("ssh", CommandOutput::failed(255, "Connection refused"));

        let err = KubeconfigProvider::new(&s, &runner)
            .with_hostname("workstation")
            .acquire()
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::RemoteFetchFailed { .. }));
    }

    #[tokio::test]
    async fn test_eks_generation() {
        let s = settings("");
        let runner = MockCommandRunner::new();
        runner.on("aws", |spec| {
            let path = spec.flag_value("--kubeconfig").unwrap();
            fs::write(path, SAMPLE_KUBECONFIG).unwrap();
            CommandOutput::ok("Added new context")
        });

        let handle = KubeconfigProvider::new(&s, &runner).acquire().await.unwrap();
        assert!(handle.is_transient());

        let call = &runner.calls()[0];
        assert_eq!(call.args[0..2], ["eks".to_string(), "update-kubeconfig".to_string()]);
        assert_eq!(call.flag_value("--name"), Some("demo"));
        assert_eq!(call.flag_value("--region"), Some("us-east-2"));
        assert_eq!(call.flag_value("--kubeconfig"), handle.path().to_str());
    }

    #[tokio::test]
    async fn test_eks_aws_missing() {
        let s = settings("");
        let runner = MockCommandRunner::new();
        runner.missing("aws");

        let err = KubeconfigProvider::new(&s, &runner).acquire().await.unwrap_err();
        assert!(matches!(err, KubeError::ProviderUnavailable { ref tool } if tool == "aws"));
    }

    #[tokio::test]
    async fn test_eks_generation_failure() {
        let s = settings("");
        let runner = MockCommandRunner::new();
        runner.respond("aws", CommandOutput::failed(254, "ResourceNotFoundException"));

        let err = KubeconfigProvider::new(&s, &runner).acquire().await.unwrap_err();
        assert!(matches!(err, KubeError::GenerationFailed { .. }));
    }

    #[tokio::test]
    async fn test_eks_generation_writes_nothing() {
        let s = settings("");
        let runner = MockCommandRunner::new();

        let err = KubeconfigProvider::new(&s, &runner).acquire().await.unwrap_err();
        assert!(matches!(err, KubeError::GenerationFailed { .. }));
    }

    #[tokio::test]
    async fn test_eks_ignores_k0s_endpoint() {
        let s = settings("k0s:\n  api_endpoint: https://203.0.113.7:6443\n");
        let runner = MockCommandRunner::new();
        runner.on("aws", |spec| {
            fs::write(spec.flag_value("--kubeconfig").unwrap(), SAMPLE_KUBECONFIG).unwrap();
            CommandOutput::ok("")
        });

        let handle = KubeconfigProvider::new(&s, &runner).acquire().await.unwrap();
        let kc = handle.kubeconfig().unwrap();
        assert_eq!(
            kc.clusters[0].cluster.as_ref().unwrap().server.as_deref(),
            Some("https://10.0.0.5:6443")
        );
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home(Path::new("/abs/key")), PathBuf::from("/abs/key"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/.ssh/id")), home.join(".ssh/id"));
        }
    }
}
