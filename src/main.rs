use clap::Parser;
use sidecar_sync::Settings;
use sidecar_sync::cli::commands::{init, sessions, tree};
use sidecar_sync::cli::{Cli, Commands};
use sidecar_sync::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Using default configuration for now.");
        Settings::default()
    });

    logging::init_with_config(&config.logging);

    match cli.command {
        Commands::Init { force } => {
            let path = init::run_init(&std::env::current_dir()?, force)?;
            println!("Created configuration file at: {}", path.display());
        }
        Commands::Tree { dir, depth, watch } => {
            tree::run_tree(dir, depth, watch, &config).await?;
        }
        Commands::Sessions { dir } => {
            sessions::run_sessions(dir, &config).await?;
        }
        Commands::Config => init::run_config(&config),
    }

    Ok(())
}
