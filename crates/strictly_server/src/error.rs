//! Error types for the game server.
//!
//! Four families, none of them fatal to the process:
//! - [`ServerError`] with [`ErrorKind::Protocol`]: malformed or unknown input,
//!   logged and skipped.
//! - [`ServerError`] with [`ErrorKind::Transport`]: read or write failure,
//!   ends the one connection and triggers its cleanup.
//! - [`LoginError`]: answered with `LOGIN_FAILED`.
//! - [`SessionError`]: answered with an informational chat.

use derive_more::{Display, Error};
use strictly_connect_four::MoveError;
use tokio_util::codec::LinesCodecError;
use tracing::instrument;

/// Category of a [`ServerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    /// Unparseable line, unknown kind, bad payload.
    #[display("Protocol")]
    Protocol,
    /// Socket read or write failure.
    #[display("Transport")]
    Transport,
}

/// Server error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("{} error: {} at {}:{}", kind, message, file, line)]
pub struct ServerError {
    /// Error category.
    pub kind: ErrorKind,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ServerError {
    /// Creates a new error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Creates a protocol error.
    #[track_caller]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    /// Creates a transport error.
    #[track_caller]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Returns true if the connection can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        self.kind == ErrorKind::Protocol
    }
}

impl From<std::io::Error> for ServerError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Self::transport(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for ServerError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::protocol(format!("JSON error: {}", err))
    }
}

impl From<LinesCodecError> for ServerError {
    #[track_caller]
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => Self::protocol("Line too long"),
            LinesCodecError::Io(e) => Self::from(e),
        }
    }
}

/// Why a login was refused.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum LoginError {
    /// Another live connection holds the name.
    #[display("Username already taken. Please choose another.")]
    NameTaken,
    /// Empty, reserved or too long.
    #[display("Invalid username: {}", reason)]
    InvalidName {
        /// What is wrong with the name.
        reason: String,
    },
    /// This connection is already logged in.
    #[display("You are already logged in as {}.", name)]
    AlreadyLoggedIn {
        /// The name this connection holds.
        name: String,
    },
}

impl std::error::Error for LoginError {}

/// Why a game action was refused.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SessionError {
    /// The connection has not logged in.
    #[display("You must login first!")]
    NotLoggedIn,
    /// The user has no active pairing.
    #[display("You are not in a game.")]
    NotInGame,
    /// The rules engine rejected the move.
    #[display("Invalid move: {}", _0)]
    Move(MoveError),
    /// Rematch asked for before the current round ended.
    #[display("The current game is still in progress.")]
    RoundInProgress,
    /// The pairing ended while the request was in flight.
    #[display("That game has ended.")]
    Closed,
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Move(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MoveError> for SessionError {
    fn from(err: MoveError) -> Self {
        SessionError::Move(err)
    }
}

/// Result type alias for transport and protocol operations.
pub type Result<T> = std::result::Result<T, ServerError>;
