use crate::project;
use colored::Colorize;
use infraflow_cloud::{
    CancelHandle, DeploymentResult, ExecuteOptions, ExportValue, NodeState, RetryConfig,
    RetryingAdapter, RunOutcome, StateManager, execute,
};
use infraflow_cloud_local::LocalProvider;
use infraflow_config::{ProviderSettings, RunSettings};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Exit code when some resources failed or were skipped
const EXIT_PARTIAL: i32 = 2;
/// Exit code after Ctrl-C
const EXIT_CANCELLED: i32 = 130;

pub async fn handle(
    file: Option<&Path>,
    timeout: Option<u64>,
    max_parallel: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let (files, deployment) = project::load(file)?;
    let graph = deployment.graph()?;

    let run = RunSettings::from_env()?.merge(timeout.map(Duration::from_secs), max_parallel);
    let settings = ProviderSettings::from_env();

    let lock = StateManager::new(&files.project_root).acquire_lock().await?;
    let provider = LocalProvider::open(&files.project_root, settings).await?;
    let adapter = Arc::new(RetryingAdapter::new(provider, RetryConfig::default()));

    let cancel = CancelHandle::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling: waiting for in-flight resources...".yellow());
            on_interrupt.cancel();
        }
    });

    let mut options = ExecuteOptions::new().with_cancel(cancel);
    if let Some(limit) = run.node_timeout {
        options = options.with_node_timeout(limit);
    }
    if let Some(max) = run.max_parallel {
        options = options.with_max_parallel(max);
    }

    if !json {
        println!(
            "{} {} ({} resources)",
            "Applying".green().bold(),
            deployment.name.cyan(),
            graph.len()
        );
    }

    let result = execute(graph, adapter, options).await;
    lock.release().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_report(&result);
    }

    match result.outcome {
        RunOutcome::Succeeded => Ok(()),
        RunOutcome::PartialFailure => std::process::exit(EXIT_PARTIAL),
        RunOutcome::Cancelled => std::process::exit(EXIT_CANCELLED),
    }
}

fn print_report(result: &DeploymentResult) {
    println!();
    for node in result.nodes.values() {
        let elapsed = node
            .duration_ms
            .map(|ms| format!(" {}ms", ms))
            .unwrap_or_default();
        match node.state {
            NodeState::Created => println!(
                "  {} {} ({}){}",
                "✓".green(),
                node.id.cyan(),
                node.kind,
                elapsed.dimmed()
            ),
            NodeState::Failed => println!(
                "  {} {} ({}): {}",
                "✗".red(),
                node.id.cyan(),
                node.kind,
                describe(&node.error).red()
            ),
            _ => println!(
                "  {} {} ({}): {}",
                "-".yellow(),
                node.id.cyan(),
                node.kind,
                describe(&node.error).yellow()
            ),
        }
    }

    if !result.exports.is_empty() {
        println!();
        println!("{}", "Exports:".bold());
        for (name, export) in &result.exports {
            match export {
                ExportValue::Available { value, .. } => println!("  {} = {}", name.cyan(), value),
                ExportValue::Unavailable { node, reason } => println!(
                    "  {} {}",
                    name.cyan(),
                    format!("(unavailable: {} {})", node, reason).dimmed()
                ),
            }
        }
    }

    println!();
    let summary = result.summary().to_string();
    match result.outcome {
        RunOutcome::Succeeded => println!("{} {}", "✓".green().bold(), summary.green()),
        RunOutcome::PartialFailure => println!("{} {}", "✗".red().bold(), summary.red()),
        RunOutcome::Cancelled => println!("{} {} (cancelled)", "-".yellow().bold(), summary.yellow()),
    }
}

fn describe(error: &Option<infraflow_cloud::NodeError>) -> String {
    error
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no reason recorded".to_string())
}
