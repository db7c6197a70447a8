//! Wire protocol: the message envelope and its JSON-lines encoding.
//!
//! Every message in either direction is one [`Envelope`] serialized as a
//! single line of JSON:
//!
//! ```text
//! {"kind":"GAME_MOVE","sender":"alice","content":"3","payload":{"type":"column","value":3}}
//! ```

use crate::error::{Result, ServerError};
use serde::{Deserialize, Serialize};
use strictly_connect_four::{BoardSnapshot, Seat};
use tracing::instrument;

/// Sender name used for every server-originated envelope.
pub const SERVER_SENDER: &str = "SERVER";

/// Kind of an envelope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Chat text, either direction.
    Chat,
    /// Client asks for the name in `content`.
    Login,
    /// Name accepted.
    LoginSuccess,
    /// Name refused; reason in `content`.
    LoginFailed,
    /// Join the waiting queue, or leave it if already waiting.
    GameRequest,
    /// Paired; payload carries the recipient's seat.
    GameStarted,
    /// Client drops a piece; payload carries the column.
    GameMove,
    /// Board snapshot after a change.
    GameState,
    /// Round ended; payload carries the final snapshot.
    GameOver,
    /// Rematch in the same pairing.
    PlayAgain,
    /// Leave the game and close the connection.
    Quit,
}

/// Typed payload attached to an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    /// No payload.
    #[default]
    None,
    /// A column index, as sent by the client (may be out of range).
    Column(i64),
    /// A seat assignment.
    Seat(Seat),
    /// A board snapshot.
    Board(BoardSnapshot),
}

/// The unit of communication between a client and the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// What this message is.
    pub kind: MessageKind,
    /// Who sent it. The server overwrites this for relayed chat.
    #[serde(default)]
    pub sender: String,
    /// Human-readable text.
    #[serde(default)]
    pub content: String,
    /// Optional typed data.
    #[serde(default)]
    pub payload: Payload,
}

impl Envelope {
    /// Creates an envelope with no payload.
    pub fn new(kind: MessageKind, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind,
            sender: sender.into(),
            content: content.into(),
            payload: Payload::None,
        }
    }

    /// Attaches a payload.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// A server chat line.
    pub fn server_chat(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Chat, SERVER_SENDER, content)
    }

    /// A chat line from a user.
    pub fn chat(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(MessageKind::Chat, sender, content)
    }

    /// Login request.
    pub fn login(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(MessageKind::Login, name.clone(), name)
    }

    /// Move request for a column.
    pub fn game_move(sender: impl Into<String>, column: i64) -> Self {
        Self::new(MessageKind::GameMove, sender, column.to_string())
            .with_payload(Payload::Column(column))
    }

    /// `GAME_STARTED` for one seat.
    pub fn game_started(opponent: &str, seat: Seat) -> Self {
        Self::new(
            MessageKind::GameStarted,
            SERVER_SENDER,
            format!("Game started against {}. You are {}.", opponent, seat),
        )
        .with_payload(Payload::Seat(seat))
    }

    /// `GAME_STATE` carrying a snapshot.
    pub fn game_state(snapshot: BoardSnapshot) -> Self {
        Self::new(MessageKind::GameState, SERVER_SENDER, "Game state updated")
            .with_payload(Payload::Board(snapshot))
    }

    /// `GAME_OVER` carrying the final snapshot.
    pub fn game_over(content: impl Into<String>, snapshot: BoardSnapshot) -> Self {
        Self::new(MessageKind::GameOver, SERVER_SENDER, content)
            .with_payload(Payload::Board(snapshot))
    }

    /// Returns the column of a `GAME_MOVE`.
    ///
    /// Prefers the `column` payload and falls back to parsing `content`.
    pub fn column(&self) -> Option<i64> {
        match self.payload {
            Payload::Column(col) => Some(col),
            _ => self.content.trim().parse().ok(),
        }
    }

    /// Returns the snapshot payload, if any.
    pub fn snapshot(&self) -> Option<&BoardSnapshot> {
        match &self.payload {
            Payload::Board(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Encodes as one JSON line (without the trailing newline).
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes one JSON line.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for invalid JSON, an unknown kind, or a
    /// payload that does not match any variant.
    #[instrument(skip(line), fields(len = line.len()))]
    pub fn from_line(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ServerError::protocol("Empty message"));
        }
        Ok(serde_json::from_str(line)?)
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.kind == MessageKind::Chat {
            write!(f, "{}: {}", self.sender, self.content)
        } else {
            write!(f, "{}", self.content)
        }
    }
}
