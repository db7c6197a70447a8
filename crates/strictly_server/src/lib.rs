//! Real-time two-player connect-four server.
//!
//! Clients connect over TCP and speak newline-delimited JSON [`Envelope`]s.
//! After logging in with a unique name they can chat, ask for a game, and
//! play moves that the server validates against the authoritative board.
//!
//! # Architecture
//!
//! - [`UserDirectory`]: name to live connection, unique names.
//! - [`Matchmaker`]: FIFO waiting queue and the pairing table.
//! - [`SessionStore`]: one actor task per pairing that owns the game.
//! - [`Broadcaster`]: the only way messages leave the core.
//! - [`Lobby`]: routes each inbound envelope to the owner above.
//! - [`GameServer`]: accept loop, one connection task per client.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod broadcast;
mod client;
mod config;
mod connection;
mod directory;
mod error;
mod lobby;
mod matchmaker;
mod protocol;
mod server;
mod session;

pub use broadcast::Broadcaster;
pub use client::{ClientCommand, GameClient};
pub use config::{ConfigError, ServerConfig};
pub use connection::handle_connection;
pub use directory::{ConnectionHandle, ConnectionId, UserDirectory};
pub use error::{ErrorKind, LoginError, Result, ServerError, SessionError};
pub use lobby::{ConnectionState, Flow, Lobby};
pub use matchmaker::{MatchOutcome, Matchmaker, Pairing, PairingId};
pub use protocol::{Envelope, MessageKind, Payload, SERVER_SENDER};
pub use server::GameServer;
pub use session::{GameSession, MoveApplied, SessionCommand, SessionHandle, SessionStore};
