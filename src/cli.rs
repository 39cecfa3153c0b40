use clap::Parser;
use std::path::PathBuf;

/// Command-line interface for the usage dashboard backend.
#[derive(Debug, Parser)]
#[command(author, version, about = "Claude Code usage dashboard backend", long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file (defaults to ./claude-usage.toml if present).
    #[arg(long, value_name = "FILE")]
    pub config_path: Option<PathBuf>,
    /// Print the merged dashboard metrics as JSON and exit instead of serving the API.
    #[arg(long)]
    pub print: bool,
}
