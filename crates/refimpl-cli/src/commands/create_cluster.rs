//! Create-cluster command - provision EKS with eksctl or terraform

use console::style;
use refimpl_core::Settings;
use refimpl_kube::{ClusterMode, ClusterPlan, ClusterTool, CommandRunner};
use std::path::Path;

use crate::display;
use crate::error::Result;

const TOOLS: [ClusterTool; 2] = [ClusterTool::Eksctl, ClusterTool::Terraform];
const MODES: [ClusterMode; 2] = [ClusterMode::Auto, ClusterMode::ManagedNodeGroups];

/// Run the create-cluster command
pub async fn run<R: CommandRunner>(
    settings: &Settings,
    runner: &R,
    tool: Option<ClusterTool>,
    mode: Option<ClusterMode>,
    cluster_dir: &Path,
    assume_yes: bool,
) -> Result<()> {
    let tool = match tool {
        Some(tool) => tool,
        None if assume_yes => ClusterTool::Eksctl,
        None => {
            let i = display::choose(
                "Which tool should create the cluster?",
                &["eksctl", "terraform"],
                0,
            )?;
            TOOLS[i]
        }
    };

    let default_mode = ClusterMode::from_settings(settings);
    let mode = match mode {
        Some(mode) => mode,
        None if assume_yes => default_mode,
        None => {
            let default = MODES.iter().position(|m| *m == default_mode).unwrap_or(0);
            let i = display::choose(
                "Which cluster mode?",
                &["auto mode", "managed node groups"],
                default,
            )?;
            MODES[i]
        }
    };

    let plan = ClusterPlan::new(settings, tool, mode).with_base_dir(cluster_dir);
    println!(
        "{} Creating cluster {} in {} with {} ({})",
        style("→").blue().bold(),
        style(&plan.cluster_name).cyan(),
        style(&plan.region).yellow(),
        tool,
        mode
    );
    println!("  Using {}", plan.artifact().display());

    plan.execute(runner).await?;

    display::success(&format!("Cluster {} created", plan.cluster_name));
    Ok(())
}
