mod commands;
mod project;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "iflow")]
#[command(about = "Declare cloud resources, let the graph decide the order", long_about = None)]
struct Cli {
    /// Deployment file (default: infra.kdl in the current project)
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the deployment file and its dependency graph
    Validate,
    /// Show the execution waves without creating anything
    Plan,
    /// Create or update every resource in dependency order
    Apply {
        /// Per-resource timeout in seconds
        #[arg(short, long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Maximum resources created at once
        #[arg(short = 'p', long, value_name = "N")]
        max_parallel: Option<usize>,
        /// Print the deployment result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List resources recorded in the project state
    State,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout is reserved for command output
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let file = cli.file.as_deref();
    match cli.command {
        Commands::Validate => commands::validate::handle(file),
        Commands::Plan => commands::plan::handle(file),
        Commands::Apply {
            timeout,
            max_parallel,
            json,
        } => commands::apply::handle(file, timeout, max_parallel, json).await,
        Commands::State => commands::state::handle(file).await,
        Commands::Version => commands::version::handle(),
    }
}
