//! Command-line interface for strictly_server.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strictly Connect Four - two-player game server with matchmaking and chat
#[derive(Parser, Debug)]
#[command(name = "strictly_server")]
#[command(about = "Real-time connect-four server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the game server
    Serve {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Drop connections idle for this many seconds
        #[arg(long)]
        idle_timeout: Option<u64>,
    },

    /// Play from the terminal
    Play {
        /// Server host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Server port
        #[arg(short, long, default_value = "5555")]
        port: u16,

        /// Display name to log in with
        #[arg(short, long)]
        name: String,
    },
}
