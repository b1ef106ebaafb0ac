use crate::project;
use colored::Colorize;
use std::path::Path;

pub fn handle(file: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "Validating deployment...".blue());

    let (files, deployment) = match project::load(file) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Configuration error".red().bold());
            eprintln!("  {:#}", e);
            std::process::exit(1);
        }
    };

    println!("Deployment file: {}", files.root.display().to_string().cyan());
    if let Some(local) = &files.local_override {
        println!("Local override:  {}", local.display().to_string().cyan());
    }

    match deployment.graph() {
        Ok(graph) => {
            println!("{}", "✓ Deployment is valid".green().bold());
            println!();
            println!("Summary:");
            println!("  project:   {}", deployment.name.cyan());
            println!("  resources: {}", graph.len());
            for node in graph.nodes() {
                let deps = graph.dependencies(node.id());
                let after = if deps.is_empty() {
                    String::new()
                } else {
                    format!(" after {}", deps.join(", "))
                };
                println!("    - {} ({}){}", node.id().cyan(), node.kind(), after.dimmed());
            }
            let exports: Vec<&str> = deployment
                .resources
                .iter()
                .flat_map(|r| r.exports.iter().map(|e| e.name.as_str()))
                .collect();
            if !exports.is_empty() {
                println!("  exports:   {}", exports.join(", "));
            }
            Ok(())
        }
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Invalid dependency graph".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
