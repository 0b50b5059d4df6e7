//! AWS Secrets Manager store
//!
//! Secrets are written through the `aws` CLI. The payload reaches the CLI
//! through a private temporary file (`file://`), never the command line,
//! and that file is removed as soon as the call returns.

use async_trait::async_trait;
use refimpl_core::{SecretPayload, Settings};
use serde_json::json;
use std::collections::BTreeMap;
use std::io::Write;
use tempfile::NamedTempFile;

use super::SecretStore;
use crate::command::{CommandRunner, CommandSpec};
use crate::error::{KubeError, Result};

/// Prefix of every secret written by this store
pub const AWS_SECRET_PREFIX: &str = "cnoe-ref-impl/";

/// AWS Secrets Manager store
pub struct AwsSecretStore<'a, R: CommandRunner> {
    runner: &'a R,
    region: String,
    tags: BTreeMap<String, String>,
}

impl<'a, R: CommandRunner> AwsSecretStore<'a, R> {
    pub fn new(runner: &'a R, region: impl Into<String>, tags: BTreeMap<String, String>) -> Self {
        Self {
            runner,
            region: region.into(),
            tags,
        }
    }

    /// Region and tags from the settings
    pub fn from_settings(runner: &'a R, settings: &Settings) -> Self {
        Self::new(runner, settings.region.clone(), settings.tags.clone())
    }

    /// `--tags` argument in the CLI's JSON shorthand
    fn tags_argument(&self) -> Option<String> {
        if self.tags.is_empty() {
            return None;
        }
        let tags: Vec<_> = self
            .tags
            .iter()
            .map(|(k, v)| json!({"Key": k, "Value": v}))
            .collect();
        Some(serde_json::Value::Array(tags).to_string())
    }

    /// Write the payload to a private temp file
    fn payload_file(payload: &SecretPayload) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("refimpl-secret-")
            .suffix(".json")
            .tempfile()?;
        file.write_all(payload.to_json()?.as_bytes())?;
        file.flush()?;
        Ok(file)
    }

    async fn run_with_payload(
        &self,
        payload: &SecretPayload,
        build: impl FnOnce(String) -> CommandSpec,
    ) -> Result<()> {
        let file = Self::payload_file(payload)?;
        let spec = build(format!("file://{}", file.path().display()));
        let result = self.runner.run_checked(&spec).await;
        drop(file);
        result.map(|_| ())
    }
}

#[async_trait]
impl<R: CommandRunner> SecretStore for AwsSecretStore<'_, R> {
    fn name(&self) -> &str {
        "aws-secrets-manager"
    }

    fn entry_name(&self, payload: &SecretPayload) -> String {
        format!("{}{}", AWS_SECRET_PREFIX, payload.name())
    }

    async fn create(&self, payload: &SecretPayload) -> Result<()> {
        let id = self.entry_name(payload);
        let tags = self.tags_argument();
        self.run_with_payload(payload, |secret_string| {
            let spec = CommandSpec::new("aws").args([
                "secretsmanager",
                "create-secret",
                "--name",
                &id,
                "--region",
                &self.region,
                "--secret-string",
                &secret_string,
            ]);
            match tags {
                Some(tags) => spec.arg("--tags").arg(tags),
                None => spec,
            }
        })
        .await
    }

    async fn update(&self, payload: &SecretPayload) -> Result<()> {
        let id = self.entry_name(payload);
        self.run_with_payload(payload, |secret_string| {
            CommandSpec::new("aws").args([
                "secretsmanager",
                "update-secret",
                "--secret-id",
                &id,
                "--region",
                &self.region,
                "--secret-string",
                &secret_string,
            ])
        })
        .await
    }

    async fn upsert(&self, payload: &SecretPayload) -> Result<()> {
        let entry = self.entry_name(payload);
        match self.create(payload).await {
            Ok(()) => {
                tracing::info!(secret = %entry, region = %self.region, "created AWS secret");
                Ok(())
            }
            // Without the CLI an update cannot succeed either
            Err(e @ KubeError::ProviderUnavailable { .. }) => Err(e),
            Err(create_err) => {
                tracing::debug!(
                    secret = %entry,
                    error = %create_err,
                    "create-secret failed, updating"
                );
                self.update(payload)
                    .await
                    .map_err(|e| KubeError::SecretWriteFailed {
                        store: self.name().to_string(),
                        name: entry.clone(),
                        message: e.to_string(),
                    })?;
                tracing::info!(secret = %entry, region = %self.region, "updated AWS secret");
                Ok(())
            }
        }
    }
}
