//! Terminal output and interactive prompts

use console::style;
use refimpl_core::{Distro, Settings};
use refimpl_kube::{OperationSummary, SyncReport};
use std::io::{self, BufRead, Write};

use crate::Phase;

/// Print the settings a phase is about to act on
pub fn settings_summary(phase: Phase, settings: &Settings) {
    println!(
        "{} Phase {}",
        style("→").blue().bold(),
        style(phase.as_str()).cyan().bold()
    );
    println!("  Cluster:      {}", style(&settings.cluster_name).cyan());
    println!("  Region:       {}", style(&settings.region).yellow());
    println!("  Distribution: {}", settings.distro);
    if settings.distro == Distro::K0s {
        match settings.k0s.host() {
            Some(host) if !settings.k0s.use_local => println!("  k0s host:     {}", host),
            _ => println!("  k0s host:     local"),
        }
    }
    if let Some(domain) = &settings.domain {
        let routing = if settings.path_routing { "path" } else { "domain" };
        println!("  Domain:       {} ({} routing)", domain, routing);
    }
    let mut stores = Vec::new();
    if settings.secrets.use_k8s {
        stores.push("kubernetes");
    }
    if settings.secrets.use_aws {
        stores.push("aws-secrets-manager");
    }
    if stores.is_empty() {
        stores.push("none");
    }
    println!("  Secret stores: {}", stores.join(", "));
    println!();
}

/// Ask a yes/no question on stdin; only `y` or `yes` proceeds
pub fn confirm(question: &str) -> io::Result<bool> {
    confirm_from(&mut io::stdin().lock(), &mut io::stdout(), question)
}

/// [`confirm`] over arbitrary streams
pub fn confirm_from<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> io::Result<bool> {
    write!(output, "{} {} [y/N] ", style("?").yellow().bold(), question)?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

/// Let the user pick one of `options`; an empty answer picks `default`
pub fn choose(question: &str, options: &[&str], default: usize) -> io::Result<usize> {
    choose_from(&mut io::stdin().lock(), &mut io::stdout(), question, options, default)
}

/// [`choose`] over arbitrary streams
///
/// Accepts the option's number or its name. Re-asks on anything else,
/// and falls back to the default once input is exhausted.
pub fn choose_from<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
    options: &[&str],
    default: usize,
) -> io::Result<usize> {
    writeln!(output, "{} {}", style("?").yellow().bold(), question)?;
    for (i, option) in options.iter().enumerate() {
        let marker = if i == default { " (default)" } else { "" };
        writeln!(output, "  {}) {}{}", i + 1, option, marker)?;
    }

    loop {
        write!(output, "  Choice [{}]: ", default + 1)?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(default);
        }
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(default);
        }
        if let Ok(n) = answer.parse::<usize>() {
            if (1..=options.len()).contains(&n) {
                return Ok(n - 1);
            }
        }
        if let Some(i) = options.iter().position(|o| o.eq_ignore_ascii_case(answer)) {
            return Ok(i);
        }
        writeln!(output, "  {} not a valid choice", style("✗").red())?;
    }
}

pub fn step(message: &str) {
    println!("{} {}", style("→").blue().bold(), message);
}

pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", style("⚠").yellow(), message);
}

/// Per-resource lines of an apply or delete run
pub fn operation_summary(summary: &OperationSummary) {
    for name in &summary.succeeded {
        println!("  {} {}", style("✓").green(), name);
    }
    for (name, reason) in &summary.skipped {
        println!("  {} {} ({})", style("-").dim(), name, reason);
    }
    for (name, err) in &summary.failed {
        println!("  {} {}: {}", style("✗").red(), name, err);
    }
}

/// Per-entry lines of a secret sync run
pub fn sync_report(report: &SyncReport) {
    for (store, entry) in &report.written {
        println!("  {} {} → {}", style("✓").green(), entry, store);
    }
    for (store, entry, err) in &report.failed {
        println!("  {} {} → {}: {}", style("✗").red(), entry, store, err);
    }
}
