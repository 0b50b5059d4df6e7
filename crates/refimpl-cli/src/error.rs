//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps library errors to the documented exit codes.

use miette::Diagnostic;
use refimpl_core::CoreError;
use refimpl_kube::KubeError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Configuration file missing or invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(refimpl::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Local kubeconfig missing
    #[error("Kubeconfig unavailable: {message}")]
    #[diagnostic(code(refimpl::cli::credentials))]
    CredentialUnavailable {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Remote kubeconfig fetch returned nothing usable
    #[error("Kubeconfig fetch failed: {message}")]
    #[diagnostic(code(refimpl::cli::credentials_empty))]
    CredentialEmpty {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// External tool not installed
    #[error("Required tool '{tool}' not found")]
    #[diagnostic(code(refimpl::cli::tool_missing))]
    ToolMissing {
        tool: String,
        #[help]
        help: Option<String>,
    },

    /// Secrets input directory empty or unreadable
    #[error("Secret input error: {message}")]
    #[diagnostic(code(refimpl::cli::input))]
    InputData {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Applications did not become ready in time
    #[error("{message}")]
    #[diagnostic(
        code(refimpl::cli::readiness),
        help("check the applications with `kubectl get applications -n argocd`")
    )]
    Readiness { message: String },

    /// One or more secret writes failed
    #[error("Secret synchronization incomplete: {summary}")]
    #[diagnostic(code(refimpl::cli::secrets))]
    SecretsFailed {
        summary: String,
        #[help]
        help: Option<String>,
    },

    /// The run was stopped by a signal
    #[error("Interrupted by {signal}")]
    #[diagnostic(
        code(refimpl::cli::interrupted),
        help("temporary kubeconfigs were removed; run the phase again to resume")
    )]
    Interrupted { signal: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(refimpl::cli::error))]
    Other { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(refimpl::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::CredentialUnavailable { .. } => exit_codes::CREDENTIAL_UNAVAILABLE,
            CliError::CredentialEmpty { .. } => exit_codes::CREDENTIAL_EMPTY,
            CliError::ToolMissing { .. } => exit_codes::TOOL_MISSING,
            CliError::Interrupted { .. } => exit_codes::INTERRUPTED,
            CliError::Config { .. }
            | CliError::InputData { .. }
            | CliError::Readiness { .. }
            | CliError::SecretsFailed { .. }
            | CliError::Other { .. }
            | CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::MissingFile { ref path } => CliError::Config {
                help: Some(format!(
                    "create {} or point --config / CONFIG_FILE at an existing file",
                    path
                )),
                message,
            },
            CoreError::MissingField { ref field } => CliError::Config {
                help: Some(format!("add `{}` to the configuration file", field)),
                message,
            },
            CoreError::InvalidConfig { .. } | CoreError::YamlParse(_) => CliError::Config {
                message,
                help: None,
            },
            CoreError::DirectoryMissing { .. } | CoreError::NoInputFiles { .. } => {
                CliError::InputData {
                    message,
                    help: Some(
                        "place one YAML file per GitHub App in the private directory".to_string(),
                    ),
                }
            }
            CoreError::DocumentParse { .. } => CliError::InputData {
                message,
                help: None,
            },
            CoreError::JsonEncode(_) | CoreError::Io(_) => CliError::Other { message },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        let message = err.to_string();
        match err {
            KubeError::Core(core) => core.into(),
            KubeError::CredentialSourceUnavailable { .. } => CliError::CredentialUnavailable {
                message,
                help: Some(
                    "run on the k0s controller, or set k0s.control_plane_host to fetch it over ssh"
                        .to_string(),
                ),
            },
            KubeError::RemoteFetchFailed { ref host, .. } => CliError::CredentialEmpty {
                help: Some(format!(
                    "check ssh access and passwordless sudo for the configured user on {}",
                    host
                )),
                message,
            },
            KubeError::ProviderUnavailable { tool } => CliError::ToolMissing {
                help: Some(format!("install {} and make sure it is on PATH", tool)),
                tool,
            },
            KubeError::ReadinessTimeout { .. } => CliError::Readiness { message },
            _ => CliError::Other { message },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Other {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
