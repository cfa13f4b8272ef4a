use crate::commands::Command;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "verso")]
#[command(version, about = "Stage, edit and publish resources in a versioned file store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(global = true, long, short, env = "VERSO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Working project; read commands fall back to the online project.
    #[arg(global = true, long, short, env = "VERSO_PROJECT")]
    pub project: Option<String>,

    /// User recorded as owner and lock holder.
    #[arg(global = true, long, short, env = "VERSO_USER", default_value = "anonymous")]
    pub user: String,

    /// Group recorded on created resources.
    #[arg(global = true, long, short, env = "VERSO_GROUP", default_value = "users")]
    pub group: String,

    /// Do not print any logs.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Use verbose output.
    #[arg(global = true, action = clap::ArgAction::Count, long, short, conflicts_with = "quiet")]
    pub verbose: u8,
}
