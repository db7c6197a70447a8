//! TCP listener and accept loop.

use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::error::Result;
use crate::lobby::Lobby;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

/// Connect-four game server.
///
/// Owns the listening socket and the [`Lobby`] shared by every connection.
#[derive(Debug)]
pub struct GameServer {
    listener: TcpListener,
    lobby: Lobby,
    config: Arc<ServerConfig>,
}

impl GameServer {
    /// Binds the configured address.
    #[instrument(skip(config), fields(host = %config.host(), port = config.port()))]
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let addr = config.bind_addr()?;
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Listening");
        Ok(Self {
            listener,
            lobby: Lobby::new(&config),
            config: Arc::new(config),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the lobby shared by all connections.
    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    /// Accepts connections forever, one task per client.
    ///
    /// A failed accept is logged and the loop continues; nothing a single
    /// client does can stop the server.
    #[instrument(skip(self))]
    pub async fn run(self) {
        info!("Accepting connections");
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(%peer, error = %e, "Failed to set TCP_NODELAY");
                    }
                    info!(%peer, "Accepted connection");
                    tokio::spawn(handle_connection(
                        stream,
                        self.lobby.clone(),
                        Arc::clone(&self.config),
                    ));
                }
                Err(e) => warn!(error = %e, "Accept failed"),
            }
        }
    }
}
