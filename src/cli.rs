//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for eventlink.

use clap::{Parser, Subcommand};

/// eventlink - resilient duplex WebSocket client
///
/// Keeps a long-lived WebSocket connection open, prints every message the
/// server pushes, and runs request/response exchanges over the same socket.
#[derive(Parser, Debug)]
#[command(name = "eventlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, env = "EVENTLINK_CONFIG", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect and print every inbound message until Ctrl-C
    Watch {
        /// Server URI (ws:// or wss://); overrides the configured one
        #[arg(short, long)]
        uri: Option<String>,

        /// Heartbeat sent on every receive-loop iteration
        #[arg(long)]
        heartbeat: Option<String>,
    },

    /// Send one command and print the reply
    Send {
        /// Text to send
        command: String,

        /// Server URI (ws:// or wss://); overrides the configured one
        #[arg(short, long)]
        uri: Option<String>,

        /// Keep reading until a reply matches this regular expression
        #[arg(short, long)]
        expect: Option<String>,

        /// Reply timeout in milliseconds (0 waits indefinitely)
        #[arg(short, long, default_value = "5000")]
        timeout_ms: u64,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate,
}
