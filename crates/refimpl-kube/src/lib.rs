//! Refimpl Kube - cluster and cloud integration for the reference implementation bootstrapper
//!
//! This crate provides:
//! - **Command Runner**: every `aws`, `ssh`, `eksctl` and `terraform` call behind one seam
//! - **Kubeconfig Provider**: local k0s file, remote fetch over ssh, or EKS generation
//! - **Readiness Waiter**: three-stage wait for Argo CD applications to become healthy
//! - **Secret Stores**: Kubernetes Secrets and AWS Secrets Manager, plus an in-memory mock
//! - **Resources**: Server-Side Apply of bootstrap manifests and CRD removal
//! - **Cluster**: creation plans (eksctl / terraform), install and teardown

pub mod cluster;
pub mod command;
pub mod error;
pub mod kubeconfig;
pub mod readiness;
pub mod resources;
pub mod secrets;

pub use cluster::{
    Bootstrapper, ClusterMode, ClusterPlan, ClusterTool, DEFAULT_BOOTSTRAP_DIR,
    DEFAULT_CLUSTER_DIR, DEFAULT_CRD_GROUPS, TeardownConfig, TeardownOutcome,
    default_crd_groups, remove_applications,
};
pub use command::{
    CommandOutput, CommandRunner, CommandSpec, MockCommandRunner, SystemCommandRunner,
};
pub use error::{KubeError, Result};
pub use kubeconfig::{
    K0S_ADMIN_KUBECONFIG, KubeconfigHandle, KubeconfigProvider, KubeconfigStrategy,
    current_hostname, is_local_host,
};
pub use readiness::{
    ARGOCD_NAMESPACE, ApplicationSource, ApplicationStatus, CountOutcome, KubeApplicationSource,
    MockApplicationSource, Observation, ROOT_APPLICATION, ReadinessConfig, ReadinessWaiter,
};
pub use resources::{OperationSummary, ResourceManager};
pub use secrets::{
    AWS_SECRET_PREFIX, AwsSecretStore, K8S_SECRET_PREFIX, KubeSecretStore, MockSecretStore,
    OperationCounts, SECRET_DATA_KEY, SecretStore, SecretSynchronizer, SyncReport,
};
