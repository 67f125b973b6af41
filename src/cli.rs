use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(name = "hearth-gateway", version, about = "Sharded Discord gateway process")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "HEARTH_CONFIG",
        default_value = DEFAULT_CONFIG_PATH,
        help = "Configuration file, created from a template if missing"
    )]
    pub config: PathBuf,
    #[arg(long, global = true, env = "HEARTH_MODULE_DIR", help = "Module directory, overrides [modules] directory")]
    pub modules: Option<PathBuf>,
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the gateway (default)
    Run,
    /// Print version and build metadata, then exit
    BuildInfo {
        #[arg(long, help = "Output machine-readable JSON")]
        json: bool,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Cli {
    pub fn action(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}
