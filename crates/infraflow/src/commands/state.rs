use crate::project;
use colored::Colorize;
use infraflow_cloud::StateManager;
use std::path::Path;

pub async fn handle(file: Option<&Path>) -> anyhow::Result<()> {
    let (files, deployment) = project::load(file)?;
    let state = StateManager::new(&files.project_root).load().await?;

    if state.resources.is_empty() {
        println!("{}", "No resources recorded yet".yellow());
        return Ok(());
    }

    println!(
        "{} {} (updated {})",
        "State of".bold(),
        deployment.name.cyan(),
        state.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for (id, record) in &state.resources {
        let declared = if deployment.resource(id).is_some() {
            String::new()
        } else {
            " (no longer declared)".yellow().to_string()
        };
        let location = record
            .get_output::<String>("location")
            .map(|l| format!(" in {}", l))
            .unwrap_or_default();
        println!("  {} ({}){}{}", id.cyan(), record.kind, location, declared);
        println!("      {}", record.remote_id.dimmed());
    }
    Ok(())
}
