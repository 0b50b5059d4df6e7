//! CLI commands, one module per phase

pub mod create_cluster;
pub mod crd_uninstall;
pub mod install;
pub mod secrets;
pub mod uninstall;

use refimpl_core::Settings;
use refimpl_kube::{
    KubeconfigHandle, KubeconfigProvider, SecretSynchronizer, SystemCommandRunner,
};

use crate::error::{CliError, Result};
use crate::{Cli, Phase, display};

/// Load config, confirm, then run the phase until it ends or a signal arrives
///
/// An interrupted phase is dropped before this returns, which removes any
/// transient kubeconfig it was holding.
pub async fn run(cli: &Cli) -> Result<()> {
    let settings = Settings::load(&cli.config)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    display::settings_summary(cli.phase, &settings);

    if !cli.yes && !display::confirm(&format!("Run {}?", cli.phase.as_str()))? {
        display::warning("Aborted, nothing was changed");
        return Ok(());
    }

    tokio::select! {
        result = dispatch(cli, &settings) => result,
        signal = shutdown_signal() => {
            tracing::warn!(signal, "interrupted, cleaning up");
            Err(CliError::Interrupted {
                signal: signal.to_string(),
            })
        }
    }
}

async fn dispatch(cli: &Cli, settings: &Settings) -> Result<()> {
    let runner = SystemCommandRunner::new();

    match cli.phase {
        Phase::CreateCluster => {
            create_cluster::run(
                settings,
                &runner,
                cli.tool,
                cli.mode,
                &cli.cluster_dir,
                cli.yes,
            )
            .await
        }
        Phase::Install => {
            let kubeconfig = acquire_kubeconfig(settings, &runner).await?;
            install::run(settings, &kubeconfig, &cli.bootstrap_dir).await
        }
        Phase::Uninstall => {
            let kubeconfig = acquire_kubeconfig(settings, &runner).await?;
            uninstall::run(&kubeconfig).await
        }
        Phase::CrdUninstall => {
            let kubeconfig = acquire_kubeconfig(settings, &runner).await?;
            crd_uninstall::run(&kubeconfig, &cli.crd_groups).await
        }
        Phase::CreateUpdateSecrets => {
            // Bad input must fail before any credential is fetched
            let payloads = SecretSynchronizer::build_payloads(settings, &cli.private_dir)?;
            let kubeconfig = if settings.secrets.use_k8s {
                Some(acquire_kubeconfig(settings, &runner).await?)
            } else {
                None
            };
            secrets::run(settings, &runner, kubeconfig.as_ref(), &payloads).await
        }
    }
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => tokio::select! {
                _ = interrupt => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
            },
            Err(e) => {
                tracing::debug!(error = %e, "SIGTERM handler unavailable");
                interrupt.await;
                "SIGINT"
            }
        }
    }

    #[cfg(not(unix))]
    {
        interrupt.await;
        "SIGINT"
    }
}

async fn acquire_kubeconfig(
    settings: &Settings,
    runner: &SystemCommandRunner,
) -> Result<KubeconfigHandle> {
    let provider = KubeconfigProvider::new(settings, runner);
    display::step(&format!(
        "Acquiring kubeconfig ({})",
        provider.strategy().label()
    ));
    let handle = provider.acquire().await?;
    tracing::debug!(
        path = %handle.path().display(),
        transient = handle.is_transient(),
        "kubeconfig ready"
    );
    Ok(handle)
}
