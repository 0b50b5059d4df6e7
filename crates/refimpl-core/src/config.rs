//! Configuration loading
//!
//! The whole run is driven by one YAML document (usually `config.yaml`).
//! It is parsed once into [`Settings`] and handed by reference to every
//! component; nothing mutates it afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Default ceiling for the final "all applications healthy" wait
pub const DEFAULT_FINAL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Kubernetes distribution backing the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distro {
    /// Amazon EKS (managed control plane)
    #[default]
    Eks,
    /// Self-hosted k0s control plane
    K0s,
}

impl Distro {
    /// Parse the `k8s_distro` value (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eks" => Some(Self::Eks),
            "k0s" => Some(Self::K0s),
            _ => None,
        }
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distro::Eks => write!(f, "eks"),
            Distro::K0s => write!(f, "k0s"),
        }
    }
}

/// Connection parameters for a k0s control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct K0sSettings {
    /// Host running the k0s controller (empty means this machine)
    pub control_plane_host: Option<String>,

    /// SSH user for remote fetches
    pub ssh_user: String,

    /// Private key passed to ssh with `-i`
    pub ssh_key_path: Option<PathBuf>,

    /// Overrides the API server address written in the kubeconfig
    pub api_endpoint: Option<String>,

    /// Always read the kubeconfig from this machine
    pub use_local: bool,
}

impl Default for K0sSettings {
    fn default() -> Self {
        Self {
            control_plane_host: None,
            ssh_user: "root".to_string(),
            ssh_key_path: None,
            api_endpoint: None,
            use_local: false,
        }
    }
}

impl K0sSettings {
    /// Configured control-plane host, ignoring blank values
    pub fn host(&self) -> Option<&str> {
        self.control_plane_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }

    /// Configured API endpoint override, ignoring blank values
    pub fn endpoint(&self) -> Option<&str> {
        self.api_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

/// Which secret stores receive the payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsSettings {
    /// Push to AWS Secrets Manager
    pub use_aws: bool,

    /// Push to Kubernetes Secrets
    pub use_k8s: bool,
}

impl Default for SecretsSettings {
    fn default() -> Self {
        Self {
            use_aws: false,
            use_k8s: true,
        }
    }
}

/// Readiness tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    /// Cap for the final wait; negative means no cap
    pub final_timeout_seconds: Option<i64>,
}

impl ReadinessSettings {
    /// Final wait ceiling, `None` when unbounded
    pub fn final_timeout(&self) -> Option<Duration> {
        match self.final_timeout_seconds {
            None => Some(DEFAULT_FINAL_TIMEOUT),
            Some(secs) if secs < 0 => None,
            Some(secs) => Some(Duration::from_secs(secs as u64)),
        }
    }
}

/// Shape of the document before required fields are checked
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    cluster_name: Option<String>,
    region: Option<String>,
    domain: Option<String>,
    path_routing: bool,
    auto_mode: bool,
    k8s_distro: Option<String>,
    k0s: K0sSettings,
    tags: BTreeMap<String, String>,
    secrets: SecretsSettings,
    readiness: ReadinessSettings,
}

/// Immutable settings for one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub cluster_name: String,
    pub region: String,
    pub domain: Option<String>,
    pub path_routing: bool,
    pub auto_mode: bool,
    pub distro: Distro,
    pub k0s: K0sSettings,
    pub tags: BTreeMap<String, String>,
    pub secrets: SecretsSettings,
    pub readiness: ReadinessSettings,

    /// The original document, converted to JSON
    document: JsonValue,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CoreError::MissingFile {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse settings from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut document: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        if document.is_null() {
            document = serde_yaml::Value::Mapping(Default::default());
        }
        if !document.is_mapping() {
            return Err(CoreError::InvalidConfig {
                message: "top level must be a mapping".to_string(),
            });
        }

        let raw: RawSettings = serde_yaml::from_value(document.clone())?;
        let json = serde_json::to_value(&document)?;

        let distro = match raw.k8s_distro.as_deref() {
            None => Distro::default(),
            Some(s) if s.trim().is_empty() => Distro::default(),
            Some(s) => Distro::parse(s).ok_or_else(|| CoreError::InvalidConfig {
                message: format!("unknown k8s_distro '{}' (expected 'eks' or 'k0s')", s),
            })?,
        };

        Ok(Self {
            cluster_name: required(raw.cluster_name, "cluster_name")?,
            region: required(raw.region, "region")?,
            domain: raw.domain.filter(|d| !d.trim().is_empty()),
            path_routing: raw.path_routing,
            auto_mode: raw.auto_mode,
            distro,
            k0s: raw.k0s,
            tags: raw.tags,
            secrets: raw.secrets,
            readiness: raw.readiness,
            document: json,
        })
    }

    /// The full configuration document as JSON, unmodified
    pub fn document(&self) -> &JsonValue {
        &self.document
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::MissingField {
            field: field.to_string(),
        })
}
