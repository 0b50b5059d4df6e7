//! Create-update-secrets command - push GitHub App and config secrets

use refimpl_core::{SecretPayload, Settings};
use refimpl_kube::{
    AwsSecretStore, CommandRunner, KubeSecretStore, KubeconfigHandle, SecretSynchronizer,
};

use crate::display;
use crate::error::{CliError, Result};

/// Run the create-update-secrets command on payloads assembled by the caller
pub async fn run<R: CommandRunner>(
    settings: &Settings,
    runner: &R,
    kubeconfig: Option<&KubeconfigHandle>,
    payloads: &[SecretPayload],
) -> Result<()> {
    let mut sync = SecretSynchronizer::new();
    if let (true, Some(kubeconfig)) = (settings.secrets.use_k8s, kubeconfig) {
        sync = sync.with_store(KubeSecretStore::new(kubeconfig.client().await?));
    }
    if settings.secrets.use_aws {
        sync = sync.with_store(AwsSecretStore::from_settings(runner, settings));
    }

    if sync.store_names().is_empty() {
        display::warning("Both secrets.use_k8s and secrets.use_aws are disabled, nothing to write");
        return Ok(());
    }

    display::step(&format!(
        "Writing {} payload(s) to {}",
        payloads.len(),
        sync.store_names().join(", ")
    ));

    let report = sync.sync(payloads).await;
    display::sync_report(&report);

    if let Some(tool) = report.missing_tool() {
        return Err(CliError::ToolMissing {
            tool: tool.to_string(),
            help: Some(format!(
                "install `{}` and run create-update-secrets again ({})",
                tool,
                report.summary()
            )),
        });
    }

    if !report.is_success() {
        return Err(CliError::SecretsFailed {
            summary: report.summary(),
            help: Some("fix the failing store and run create-update-secrets again".to_string()),
        });
    }

    display::success(&report.summary());
    Ok(())
}
