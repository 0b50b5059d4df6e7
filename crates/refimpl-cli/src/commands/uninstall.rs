//! Uninstall command - remove every Argo CD application

use refimpl_kube::{Bootstrapper, KubeconfigHandle, TeardownConfig, TeardownOutcome};

use crate::display;
use crate::error::Result;

/// Run the uninstall command
pub async fn run(kubeconfig: &KubeconfigHandle) -> Result<()> {
    display::step("Deleting Argo CD applications");

    let client = kubeconfig.client().await?;
    match Bootstrapper::new(client)
        .uninstall(TeardownConfig::default())
        .await?
    {
        TeardownOutcome::Removed(0) => display::success("No applications to remove"),
        TeardownOutcome::Removed(n) => display::success(&format!("Removed {} application(s)", n)),
        TeardownOutcome::TimedOut { remaining } => display::warning(&format!(
            "{} application(s) still terminating; check their finalizers",
            remaining
        )),
    }
    Ok(())
}
