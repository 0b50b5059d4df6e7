//! Secret stores and the synchronizer that fills them
//!
//! Two stores are supported:
//! - **Kubernetes** (default): a Secret per payload, written with Server-Side Apply
//! - **AWS Secrets Manager**: a secret per payload, created or updated through the `aws` CLI
//!
//! Payloads are assembled in full before any store is touched. A failed
//! write is reported and the remaining stores and payloads still run.

mod aws;
mod k8s;
mod mock;

pub use aws::{AWS_SECRET_PREFIX, AwsSecretStore};
pub use k8s::{K8S_SECRET_PREFIX, KubeSecretStore, SECRET_DATA_KEY, secret_manifest};
pub use mock::{MockSecretStore, OperationCounts};

use async_trait::async_trait;
use refimpl_core::{DOCUMENT_EXTENSION, GITHUB_APP_PAYLOAD, SecretPayload, Settings};
use std::path::Path;

use crate::error::{KubeError, Result};

/// A system of record for secret payloads
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Human readable store name for reports
    fn name(&self) -> &str;

    /// Entry name used for a payload in this store
    fn entry_name(&self, payload: &SecretPayload) -> String;

    /// Create a new entry; fails if it already exists
    async fn create(&self, payload: &SecretPayload) -> Result<()>;

    /// Replace the value of an existing entry
    async fn update(&self, payload: &SecretPayload) -> Result<()>;

    /// Create the entry, or update it when creation fails
    async fn upsert(&self, payload: &SecretPayload) -> Result<()> {
        let entry = self.entry_name(payload);
        match self.create(payload).await {
            Ok(()) => {
                tracing::info!(store = self.name(), secret = %entry, "created secret");
                Ok(())
            }
            Err(create_err) => {
                tracing::debug!(
                    store = self.name(),
                    secret = %entry,
                    error = %create_err,
                    "create failed, updating instead"
                );
                self.update(payload)
                    .await
                    .map_err(|e| KubeError::SecretWriteFailed {
                        store: self.name().to_string(),
                        name: entry.clone(),
                        message: e.to_string(),
                    })?;
                tracing::info!(store = self.name(), secret = %entry, "updated secret");
                Ok(())
            }
        }
    }
}

/// Outcome of one synchronization run
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// `(store, entry)` pairs written successfully
    pub written: Vec<(String, String)>,
    /// `(store, entry, error)` for failed writes
    pub failed: Vec<(String, String, String)>,
    /// External tools a store could not find
    pub missing_tools: Vec<String>,
}

impl SyncReport {
    /// Check if every write succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        match (self.written.len(), self.failed.len()) {
            (0, 0) => "No secrets written".to_string(),
            (w, 0) => format!("{} secret(s) written", w),
            (w, f) => format!("{} secret(s) written, {} failed", w, f),
        }
    }

    /// First tool that was missing, if any write failed for that reason
    pub fn missing_tool(&self) -> Option<&str> {
        self.missing_tools.first().map(String::as_str)
    }

    fn record_failure(&mut self, store: &str, entry: String, err: &KubeError) {
        match err {
            KubeError::ProviderUnavailable { tool } if !self.missing_tools.contains(tool) => {
                self.missing_tools.push(tool.clone());
            }
            _ => {}
        }
        self.failed.push((store.to_string(), entry, err.to_string()));
    }
}

/// Builds the payloads and pushes them to every enabled store
#[derive(Default)]
pub struct SecretSynchronizer<'a> {
    stores: Vec<Box<dyn SecretStore + 'a>>,
}

impl<'a> SecretSynchronizer<'a> {
    pub fn new() -> Self {
        Self { stores: Vec::new() }
    }

    /// Add a store; stores are written in the order they were added
    pub fn with_store(mut self, store: impl SecretStore + 'a) -> Self {
        self.stores.push(Box::new(store));
        self
    }

    /// Names of the configured stores
    pub fn store_names(&self) -> Vec<&str> {
        self.stores.iter().map(|s| s.name()).collect()
    }

    /// Assemble the `github-app` and `config` payloads
    pub fn build_payloads(settings: &Settings, private_dir: &Path) -> Result<Vec<SecretPayload>> {
        let github_app =
            SecretPayload::from_directory(GITHUB_APP_PAYLOAD, private_dir, DOCUMENT_EXTENSION)?;
        tracing::info!(
            entries = github_app.len(),
            dir = %private_dir.display(),
            "assembled github-app payload"
        );
        let config = SecretPayload::from_settings(settings);
        Ok(vec![github_app, config])
    }

    /// Build the payloads, then push each to every store
    pub async fn sync_from(&self, settings: &Settings, private_dir: &Path) -> Result<SyncReport> {
        let payloads = Self::build_payloads(settings, private_dir)?;
        Ok(self.sync(&payloads).await)
    }

    /// Push already assembled payloads to every store
    pub async fn sync(&self, payloads: &[SecretPayload]) -> SyncReport {
        let mut report = SyncReport::default();

        if self.stores.is_empty() {
            tracing::warn!("no secret stores enabled, nothing to write");
            return report;
        }

        for payload in payloads {
            for store in &self.stores {
                let entry = store.entry_name(payload);
                match store.upsert(payload).await {
                    Ok(()) => report.written.push((store.name().to_string(), entry)),
                    Err(e) => {
                        tracing::error!(
                            store = store.name(),
                            secret = %entry,
                            error = %e,
                            "secret write failed"
                        );
                        report.record_failure(store.name(), entry, &e);
                    }
                }
            }
        }

        report
    }
}
