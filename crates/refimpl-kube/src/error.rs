//! Error types for refimpl-kube

use thiserror::Error;

/// Result type for refimpl-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while talking to clusters, clouds and hosts
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Local kubeconfig file is absent or unreadable
    #[error("kubeconfig not available at {path}: {reason}")]
    CredentialSourceUnavailable { path: String, reason: String },

    /// Remote fetch failed or returned nothing usable
    #[error("fetching kubeconfig from {host} failed: {reason}")]
    RemoteFetchFailed { host: String, reason: String },

    /// Required command line tool is not installed
    #[error("required tool '{tool}' is not installed or not on PATH")]
    ProviderUnavailable { tool: String },

    /// Kubeconfig generation or fetch command failed
    #[error("kubeconfig generation failed: {message}")]
    GenerationFailed { message: String },

    /// Kubeconfig could not be read or parsed
    #[error("invalid kubeconfig at {path}: {message}")]
    InvalidKubeconfig { path: String, message: String },

    /// External command exited non-zero
    #[error("`{command}` failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// A bounded wait ran out of time
    #[error("timed out after {elapsed:?} waiting for {what}")]
    ReadinessTimeout {
        what: String,
        elapsed: std::time::Duration,
    },

    /// Some manifests could not be applied
    #[error("applying manifests failed ({summary}): {details}")]
    ApplyFailed { summary: String, details: String },

    /// Secret store create and update both failed
    #[error("failed to write secret '{name}' to {store}: {message}")]
    SecretWriteFailed {
        store: String,
        name: String,
        message: String,
    },

    /// Input data error from the core crate
    #[error(transparent)]
    Core(#[from] refimpl_core::CoreError),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }
}
