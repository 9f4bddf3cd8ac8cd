use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "courier")]
pub struct Params {
    /// Minimum log level: trace, debug, info, warning, error or critical.
    #[arg(long, env = "COURIER_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read or write a field of a JSON document by path.
    #[command(subcommand)]
    Path(PathCommand),

    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum PathCommand {
    /// Print the node at PATH.
    Get { file: PathBuf, path: String },

    /// Write VALUE at PATH and print the updated document.
    Set {
        file: PathBuf,
        path: String,
        /// A JSON scalar; anything that is not valid JSON is taken as a string.
        value: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate a TOML config and print the effective client properties.
    Check { file: PathBuf },
}
