use crate::project;
use colored::Colorize;
use std::path::Path;

pub fn handle(file: Option<&Path>) -> anyhow::Result<()> {
    let (_, deployment) = project::load(file)?;
    let graph = deployment.graph()?;

    println!(
        "{} {} ({} resources)",
        "Plan for".bold(),
        deployment.name.cyan(),
        graph.len()
    );

    for (i, wave) in graph.levels().iter().enumerate() {
        println!();
        println!("{}", format!("Wave {}", i + 1).bold());
        for id in wave {
            let Some(node) = graph.node(id) else {
                continue;
            };
            println!("  + {} ({})", id.green(), node.kind());
            for reference in node.descriptor().references() {
                println!("      {} {}", "<-".dimmed(), reference.to_string().dimmed());
            }
        }
    }
    Ok(())
}
