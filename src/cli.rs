//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Pan-domain authentication issuer
#[derive(Parser, Debug)]
#[command(name = "panda-issuer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "PANDA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PANDA_PORT")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PANDA_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "PANDA_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the issuer (default)
    Serve,

    /// Fetch and validate the settings blob, then print a summary
    CheckSettings,

    /// Verify a credential against the current public key
    Verify {
        /// Raw credential (cookie value)
        #[arg(required = true)]
        credential: String,
    },
}
