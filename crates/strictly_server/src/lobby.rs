//! Lobby: routes each inbound envelope to the component that owns it.
//!
//! The lobby holds the shared registries ([`UserDirectory`], [`Matchmaker`],
//! [`SessionStore`]) and the [`Broadcaster`]. It has no transport of its own:
//! a connection task feeds it envelopes together with that connection's
//! [`ConnectionState`], and every reply leaves through an outbox. That keeps
//! the whole protocol state machine testable with in-memory channels.

use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::directory::{ConnectionHandle, ConnectionId, UserDirectory};
use crate::error::{LoginError, SessionError};
use crate::matchmaker::{MatchOutcome, Matchmaker, Pairing};
use crate::protocol::{Envelope, MessageKind, SERVER_SENDER};
use crate::session::SessionStore;
use strictly_connect_four::BoardSnapshot;
use tracing::{debug, info, instrument, warn};

/// Per-connection record: the outbox and, once logged in, the user name.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    handle: ConnectionHandle,
    user: Option<String>,
}

impl ConnectionState {
    /// Creates an unauthenticated record.
    pub fn new(handle: ConnectionHandle) -> Self {
        Self { handle, user: None }
    }

    /// Returns the connection id.
    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// Returns the outbox handle.
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Returns the logged-in name.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

/// What the connection should do after an envelope has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// Close the connection and run cleanup.
    Close,
}

/// The session and matchmaking engine.
#[derive(Debug, Clone)]
pub struct Lobby {
    directory: UserDirectory,
    matchmaker: Matchmaker,
    sessions: SessionStore,
    broadcaster: Broadcaster,
    max_name_length: usize,
}

impl Lobby {
    /// Creates an empty lobby sized from `config`.
    #[instrument(skip(config))]
    pub fn new(config: &ServerConfig) -> Self {
        let directory = UserDirectory::new();
        let broadcaster = Broadcaster::new(directory.clone());
        let sessions = SessionStore::new(broadcaster.clone(), *config.session_capacity());
        info!("Lobby ready");
        Self {
            directory,
            matchmaker: Matchmaker::new(),
            sessions,
            broadcaster,
            max_name_length: *config.max_name_length(),
        }
    }

    /// Returns the user directory.
    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    /// Returns the matchmaker.
    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    /// Returns the session store.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Greets a fresh connection.
    pub async fn welcome(&self, state: &ConnectionState) {
        state
            .handle
            .send(Envelope::server_chat(
                "Welcome! Please log in with a unique username.",
            ))
            .await;
    }

    /// Handles one inbound envelope.
    #[instrument(skip(self, state, envelope), fields(connection_id = %state.id(), kind = %envelope.kind))]
    pub async fn dispatch(&self, state: &mut ConnectionState, envelope: Envelope) -> Flow {
        debug!(user = ?state.user, "Dispatching");

        let user = match (envelope.kind, state.user.clone()) {
            (MessageKind::Login, _) => {
                // A failed login is answered in-band; the connection stays open.
                let _ = self.login(state, &envelope.content).await;
                return Flow::Continue;
            }
            (MessageKind::Quit, None) => return Flow::Close,
            (_, None) => {
                self.inform(state, &SessionError::NotLoggedIn).await;
                return Flow::Continue;
            }
            (_, Some(user)) => user,
        };

        match envelope.kind {
            MessageKind::Chat => self.chat(&user, envelope.content).await,
            MessageKind::GameRequest => {
                self.request_game(&user).await;
            }
            MessageKind::GameMove => match envelope.column() {
                Some(column) => {
                    if let Err(e) = self.make_move(&user, column).await {
                        self.inform(state, &e).await;
                    }
                }
                None => {
                    warn!(user = %user, content = %envelope.content, "Move without a column");
                    state
                        .handle
                        .send(Envelope::server_chat("Invalid move: no column given."))
                        .await;
                }
            },
            MessageKind::PlayAgain => {
                if let Err(e) = self.play_again(&user).await {
                    self.inform(state, &e).await;
                }
            }
            MessageKind::Quit => {
                self.quit(&user).await;
                return Flow::Close;
            }
            MessageKind::Login
            | MessageKind::LoginSuccess
            | MessageKind::LoginFailed
            | MessageKind::GameStarted
            | MessageKind::GameState
            | MessageKind::GameOver => {
                warn!(user = %user, "Unexpected message kind from client, ignoring");
            }
        }
        Flow::Continue
    }

    async fn inform(&self, state: &ConnectionState, error: &SessionError) {
        state
            .handle
            .send(Envelope::server_chat(error.to_string()))
            .await;
    }

    /// Normalizes and checks a requested display name.
    pub fn validate_name(&self, requested: &str) -> Result<String, LoginError> {
        let name = requested.trim();
        if name.is_empty() {
            return Err(LoginError::InvalidName {
                reason: "name must not be empty".to_string(),
            });
        }
        if name.eq_ignore_ascii_case(SERVER_SENDER) {
            return Err(LoginError::InvalidName {
                reason: format!("{} is reserved", name),
            });
        }
        if name.chars().count() > self.max_name_length {
            return Err(LoginError::InvalidName {
                reason: format!("name must be at most {} characters", self.max_name_length),
            });
        }
        if name.chars().any(char::is_control) {
            return Err(LoginError::InvalidName {
                reason: "name must not contain control characters".to_string(),
            });
        }
        Ok(name.to_string())
    }

    /// Binds `requested` to this connection.
    ///
    /// On success the requester gets `LOGIN_SUCCESS` and every other user a
    /// join notice. On failure the requester gets `LOGIN_FAILED` (or an
    /// informational chat if already logged in) and stays unauthenticated.
    #[instrument(skip(self, state), fields(connection_id = %state.id()))]
    pub async fn login(
        &self,
        state: &mut ConnectionState,
        requested: &str,
    ) -> Result<String, LoginError> {
        let result = self.try_login(state, requested);

        match &result {
            Ok(name) => {
                state
                    .handle
                    .send(Envelope::new(
                        MessageKind::LoginSuccess,
                        SERVER_SENDER,
                        format!("Login successful. Welcome, {}!", name),
                    ))
                    .await;
                self.broadcaster
                    .broadcast_all(
                        Envelope::server_chat(format!("{} has joined the game!", name)),
                        Some(name),
                    )
                    .await;
            }
            Err(e @ LoginError::AlreadyLoggedIn { .. }) => {
                state.handle.send(Envelope::server_chat(e.to_string())).await;
            }
            Err(e) => {
                state
                    .handle
                    .send(Envelope::new(
                        MessageKind::LoginFailed,
                        SERVER_SENDER,
                        e.to_string(),
                    ))
                    .await;
            }
        }
        result
    }

    fn try_login(
        &self,
        state: &mut ConnectionState,
        requested: &str,
    ) -> Result<String, LoginError> {
        if let Some(name) = &state.user {
            return Err(LoginError::AlreadyLoggedIn { name: name.clone() });
        }
        let name = self.validate_name(requested).inspect_err(|e| {
            warn!(requested, error = %e, "Login rejected");
        })?;
        if !self.directory.register(&name, state.handle.clone()) {
            return Err(LoginError::NameTaken);
        }
        info!(user = %name, "User logged in");
        state.user = Some(name.clone());
        Ok(name)
    }

    /// Relays chat from `user`. The sender is always the authenticated name.
    ///
    /// Paired users talk to their pairing (sender included); everyone else
    /// talks to all users online.
    #[instrument(skip(self, text))]
    pub async fn chat(&self, user: &str, text: String) {
        let envelope = Envelope::chat(user, text);
        match self.matchmaker.pairing_of(user) {
            Some(pairing) => self.broadcaster.send_to_pairing(&pairing, envelope).await,
            None => {
                self.broadcaster.broadcast_all(envelope, None).await;
            }
        }
    }

    /// Handles a game request and answers the requester.
    ///
    /// A successful match opens the pairing's session, which announces the
    /// game to both seats.
    #[instrument(skip(self))]
    pub async fn request_game(&self, user: &str) -> MatchOutcome {
        let outcome = self.matchmaker.request(user);
        let reply = match &outcome {
            MatchOutcome::Waiting => Some("Waiting for an opponent..."),
            MatchOutcome::Cancelled => Some("Game request canceled."),
            MatchOutcome::AlreadyPaired => Some("You are already in a game!"),
            MatchOutcome::Paired(pairing) => {
                let id = *pairing.id();
                self.sessions.open(pairing.clone());
                // A member may have disconnected between pairing and open.
                if self.matchmaker.pairing_of(user).map(|p| *p.id()) != Some(id) {
                    debug!(pairing_id = %id, "Pairing dissolved before session opened");
                    self.sessions.close(id).await;
                }
                None
            }
        };
        if let Some(text) = reply {
            self.broadcaster
                .send_to(user, Envelope::server_chat(text))
                .await;
        }
        outcome
    }

    /// Applies a move for `user` in their pairing.
    ///
    /// Accepted moves are broadcast by the session; rejections are returned
    /// and the board is unchanged.
    #[instrument(skip(self))]
    pub async fn make_move(&self, user: &str, column: i64) -> Result<BoardSnapshot, SessionError> {
        let pairing = self
            .matchmaker
            .pairing_of(user)
            .ok_or(SessionError::NotInGame)?;
        self.sessions.apply_move(*pairing.id(), user, column).await
    }

    /// Starts a new round in `user`'s pairing once the current one is over.
    #[instrument(skip(self))]
    pub async fn play_again(&self, user: &str) -> Result<BoardSnapshot, SessionError> {
        let pairing = self
            .matchmaker
            .pairing_of(user)
            .ok_or(SessionError::NotInGame)?;
        self.sessions.rematch(*pairing.id(), user).await
    }

    /// Leaves the current game, if any, and tells the opponent.
    #[instrument(skip(self))]
    pub async fn quit(&self, user: &str) -> bool {
        match self.matchmaker.dissolve(user) {
            Some(pairing) => {
                self.end_pairing(user, &pairing).await;
                true
            }
            None => {
                debug!(user, "Quit outside a game");
                false
            }
        }
    }

    /// Stops the pairing's session, then tells the opponent `user` left.
    async fn end_pairing(&self, user: &str, pairing: &Pairing) {
        self.sessions.close(*pairing.id()).await;
        if let Some(opponent) = pairing.opponent_of(user) {
            self.broadcaster
                .send_to(
                    opponent,
                    Envelope::server_chat(format!("{} has left the game.", user)),
                )
                .await;
        }
        info!(user, pairing_id = %pairing.id(), "User left game");
    }

    /// Disconnect cleanup for `user` on connection `id`.
    ///
    /// Leaves the waiting queue and any game (notifying the opponent), then
    /// releases the name and announces the departure. The name stays bound
    /// until matchmaking no longer knows the user. Runs at most once per
    /// login; later calls and calls from a stale connection return false.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, user: &str, id: ConnectionId) -> bool {
        if !self.directory.is_bound_to(user, id) {
            debug!(user, "Not bound to this connection");
            return false;
        }
        if let Some(pairing) = self.matchmaker.remove_user(user) {
            self.end_pairing(user, &pairing).await;
        }
        if !self.directory.release(user, id) {
            return false;
        }
        self.broadcaster
            .broadcast_all(
                Envelope::server_chat(format!("{} has disconnected.", user)),
                Some(user),
            )
            .await;
        info!(user, "User disconnected");
        true
    }
}
