//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Live file tree and session watcher
#[derive(Parser)]
#[command(
    name = "sidecar-sync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Live file tree and session watcher",
    long_about = "Keep a lazily expanded file tree and an agent session directory in sync with the disk.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom sync.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    #[command(about = "Set up .sidecar directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Print the file tree
    #[command(
        about = "Print a directory tree, optionally following changes",
        after_help = "Examples:\n  sidecar-sync tree\n  sidecar-sync tree src --depth 2\n  sidecar-sync tree --watch"
    )]
    Tree {
        /// Root directory (defaults to the current directory)
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Show rows down to this depth (1 = top level only)
        #[arg(short, long, default_value_t = 1)]
        depth: usize,

        /// Reprint whenever the tree changes, until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// Stream session events as JSON lines
    #[command(
        about = "Stream session events from a session directory",
        after_help = "Output:\n  {\"type\":\"created\",\"sessionId\":\"abc\"}\n  {\"type\":\"updated\",\"sessionId\":\"abc\"}"
    )]
    Sessions {
        /// Session directory (defaults to sessions.dir from config)
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,
}
