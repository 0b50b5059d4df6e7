//! CRD uninstall command - remove the CRDs installed by the addons

use console::style;
use refimpl_kube::{Bootstrapper, KubeconfigHandle, default_crd_groups};

use crate::display;
use crate::error::{CliError, Result};

/// Run the crd-uninstall command
pub async fn run(kubeconfig: &KubeconfigHandle, groups: &[String]) -> Result<()> {
    let groups = if groups.is_empty() {
        default_crd_groups()
    } else {
        groups.to_vec()
    };

    println!(
        "{} Deleting CRDs of {}",
        style("→").blue().bold(),
        style(groups.join(", ")).cyan()
    );
    display::warning("All custom resources of these types are deleted with them");

    let client = kubeconfig.client().await?;
    let summary = Bootstrapper::new(client).uninstall_crds(&groups).await?;
    display::operation_summary(&summary);

    if !summary.is_success() {
        return Err(CliError::Other {
            message: format!("CRD removal incomplete: {}", summary.summary()),
        });
    }

    display::success(&format!("CRD cleanup finished: {}", summary.summary()));
    Ok(())
}
