//! Strictly Connect Four - server and terminal client.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use std::path::PathBuf;
use strictly_server::{ClientCommand, GameClient, GameServer, MessageKind, ServerConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            host,
            port,
            idle_timeout,
        } => run_server(config, host, port, idle_timeout).await,
        Command::Play { host, port, name } => run_play(host, port, name).await,
    }
}

/// Run the game server
#[instrument]
async fn run_server(
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    idle_timeout: Option<u64>,
) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = match &config_path {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(host) = host {
        config = config.with_host(host);
    }
    if let Some(port) = port {
        config = config.with_port(port);
    }
    if idle_timeout.is_some() {
        config = config.with_idle_timeout_secs(idle_timeout);
    }

    info!("Starting Strictly Connect Four server");
    let server = GameServer::bind(config).await?;
    info!(addr = %server.local_addr()?, "Server ready");
    server.run().await;
    Ok(())
}

/// Run the interactive terminal client
async fn run_play(host: String, port: u16, name: String) -> Result<()> {
    // Keep the terminal for the game; logs only when asked for.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut client = GameClient::connect((host.as_str(), port)).await?;
    let welcome = client.login(&name).await?;
    println!("{}", welcome);
    println!("Commands: /play, /move N, /again, /quit. Anything else is chat.");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line? else {
                    client.quit().await?;
                    break;
                };
                match ClientCommand::parse(&line) {
                    Ok(command) => {
                        let quitting = command == ClientCommand::Quit;
                        command.send(&mut client).await?;
                        if quitting {
                            break;
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
            message = client.recv() => {
                let Some(envelope) = message? else {
                    warn!("Server closed the connection");
                    break;
                };
                match (envelope.kind, envelope.snapshot()) {
                    (MessageKind::GameState, Some(snapshot)) => println!("{}", snapshot.display()),
                    (MessageKind::GameOver, _) => println!("*** {} ***", envelope),
                    _ => println!("{}", envelope),
                }
            }
        }
    }
    Ok(())
}
