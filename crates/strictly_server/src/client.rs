//! Line-protocol client used by the terminal player and the integration tests.

use crate::protocol::{Envelope, MessageKind};
use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use std::fmt::Debug;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, instrument};

/// A connection to a game server.
#[derive(Debug)]
pub struct GameClient {
    framed: Framed<TcpStream, LinesCodec>,
    name: Option<String>,
}

impl GameClient {
    /// Connects to a server.
    #[instrument]
    pub async fn connect(addr: impl ToSocketAddrs + Debug) -> Result<Self> {
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("Failed to connect to {:?}", addr))?;
        stream.set_nodelay(true)?;
        info!("Connected to game server");
        Ok(Self {
            framed: Framed::new(stream, LinesCodec::new()),
            name: None,
        })
    }

    /// Name this client logged in with.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Sends one envelope.
    #[instrument(skip(self, envelope), fields(kind = %envelope.kind))]
    pub async fn send(&mut self, envelope: Envelope) -> Result<()> {
        let line = envelope.to_line()?;
        self.framed
            .send(line)
            .await
            .context("Failed to send message")?;
        debug!("Sent");
        Ok(())
    }

    /// Receives the next envelope, or `None` once the server has closed.
    pub async fn recv(&mut self) -> Result<Option<Envelope>> {
        match self.framed.next().await {
            Some(line) => {
                let line = line.context("Failed to read from server")?;
                Ok(Some(Envelope::from_line(&line)?))
            }
            None => Ok(None),
        }
    }

    /// Receives the next envelope, treating a closed connection as an error.
    pub async fn next_message(&mut self) -> Result<Envelope> {
        self.recv()
            .await?
            .context("Server closed the connection")
    }

    /// Skips messages until one of `kind` arrives.
    #[instrument(skip(self))]
    pub async fn wait_for(&mut self, kind: MessageKind) -> Result<Envelope> {
        loop {
            let envelope = self.next_message().await?;
            if envelope.kind == kind {
                return Ok(envelope);
            }
            debug!(skipped = %envelope.kind, "Skipping while waiting");
        }
    }

    /// Logs in and waits for the verdict.
    ///
    /// # Errors
    ///
    /// Fails with the server's reason on `LOGIN_FAILED`.
    #[instrument(skip(self))]
    pub async fn login(&mut self, name: &str) -> Result<Envelope> {
        self.send(Envelope::login(name)).await?;
        loop {
            let reply = self.next_message().await?;
            match reply.kind {
                MessageKind::LoginSuccess => {
                    self.name = Some(name.trim().to_string());
                    return Ok(reply);
                }
                MessageKind::LoginFailed => bail!("Login failed: {}", reply.content),
                _ => debug!(kind = %reply.kind, "Skipping while logging in"),
            }
        }
    }

    fn sender(&self) -> String {
        self.name.clone().unwrap_or_default()
    }

    /// Joins (or leaves) the waiting queue.
    pub async fn request_game(&mut self) -> Result<()> {
        let sender = self.sender();
        self.send(Envelope::new(MessageKind::GameRequest, sender, "Looking for a game"))
            .await
    }

    /// Drops a piece in `column`.
    pub async fn make_move(&mut self, column: i64) -> Result<()> {
        let sender = self.sender();
        self.send(Envelope::game_move(sender, column)).await
    }

    /// Asks for a rematch.
    pub async fn play_again(&mut self) -> Result<()> {
        let sender = self.sender();
        self.send(Envelope::new(MessageKind::PlayAgain, sender, "Play again"))
            .await
    }

    /// Sends chat text.
    pub async fn chat(&mut self, text: &str) -> Result<()> {
        let sender = self.sender();
        self.send(Envelope::chat(sender, text)).await
    }

    /// Leaves the game and the server.
    pub async fn quit(&mut self) -> Result<()> {
        let sender = self.sender();
        self.send(Envelope::new(MessageKind::Quit, sender, "Quit game"))
            .await
    }
}

/// A line typed by the terminal player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `/play`: request a game.
    Play,
    /// `/move N`: drop a piece.
    Move(i64),
    /// `/again`: rematch.
    Again,
    /// `/quit`: leave.
    Quit,
    /// Anything else: chat.
    Chat(String),
}

impl ClientCommand {
    /// Parses a line of terminal input.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            bail!("Nothing to send");
        }
        let Some(command) = input.strip_prefix('/') else {
            return Ok(Self::Chat(input.to_string()));
        };

        let mut parts = command.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("play"), None) => Ok(Self::Play),
            (Some("again"), None) => Ok(Self::Again),
            (Some("quit"), None) => Ok(Self::Quit),
            (Some("move"), Some(column)) => column
                .parse()
                .map(Self::Move)
                .with_context(|| format!("Not a column: {}", column)),
            _ => bail!("Unknown command: /{}", command),
        }
    }

    /// Sends this command through `client`.
    pub async fn send(self, client: &mut GameClient) -> Result<()> {
        match self {
            Self::Play => client.request_game().await,
            Self::Move(column) => client.make_move(column).await,
            Self::Again => client.play_again().await,
            Self::Quit => client.quit().await,
            Self::Chat(text) => client.chat(&text).await,
        }
    }
}
