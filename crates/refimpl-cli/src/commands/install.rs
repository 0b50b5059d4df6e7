//! Install command - bootstrap Argo CD and wait for every application

use console::style;
use refimpl_core::Settings;
use refimpl_kube::{Bootstrapper, KubeconfigHandle, ReadinessConfig};
use std::path::Path;

use crate::display;
use crate::error::Result;

/// Run the install command
pub async fn run(
    settings: &Settings,
    kubeconfig: &KubeconfigHandle,
    manifest_dir: &Path,
) -> Result<()> {
    println!(
        "{} Installing bootstrap manifests from {}",
        style("→").blue().bold(),
        style(manifest_dir.display()).cyan()
    );

    let readiness = ReadinessConfig::from_settings(settings);
    match readiness.final_timeout {
        Some(limit) => display::step(&format!(
            "Waiting up to {} minutes for applications to become healthy",
            limit.as_secs() / 60
        )),
        None => display::step("Waiting for applications to become healthy (no time limit)"),
    }

    let client = kubeconfig.client().await?;
    let summary = Bootstrapper::new(client).install(manifest_dir, readiness).await?;

    display::operation_summary(&summary);
    display::success(&format!(
        "Reference implementation installed on {} ({})",
        settings.cluster_name,
        summary.summary()
    ));
    Ok(())
}
