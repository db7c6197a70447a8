//! Game sessions: one authoritative board per pairing.
//!
//! [`GameSession`] is the synchronous core (pairing plus [`Game`]). Each live
//! session runs inside its own actor task that owns the `GameSession` and
//! processes [`SessionCommand`]s one at a time, so moves, rematches and
//! closes for one pairing are strictly serialized while different pairings
//! proceed in parallel. The actor is the only emitter of `GAME_STARTED`,
//! `GAME_STATE` and `GAME_OVER` for its pairing.

use crate::broadcast::Broadcaster;
use crate::error::SessionError;
use crate::matchmaker::{Pairing, PairingId};
use crate::protocol::Envelope;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strictly_connect_four::{BoardSnapshot, Game, GameStatus, MoveOutcome, Seat};
use strum::IntoEnumIterator;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

/// An accepted move and the state it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveApplied {
    /// Where the piece landed.
    pub outcome: MoveOutcome,
    /// State after the move.
    pub snapshot: BoardSnapshot,
}

/// Pairing plus its board.
#[derive(Debug, Clone)]
pub struct GameSession {
    pairing: Pairing,
    game: Game,
}

impl GameSession {
    /// Creates a session with an empty board, seat one to move.
    #[instrument(skip(pairing), fields(pairing_id = %pairing.id()))]
    pub fn new(pairing: Pairing) -> Self {
        info!("Creating new game session");
        Self {
            pairing,
            game: Game::new(),
        }
    }

    /// Returns the pairing.
    pub fn pairing(&self) -> &Pairing {
        &self.pairing
    }

    /// Returns an owned copy of the board state.
    pub fn snapshot(&self) -> BoardSnapshot {
        self.game.snapshot()
    }

    /// Applies `user`'s move.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotInGame`] if `user` is not seated here, otherwise the
    /// rules engine's rejection. The board is unchanged on error.
    #[instrument(skip(self), fields(pairing_id = %self.pairing.id()))]
    pub fn apply_move(&mut self, user: &str, column: i64) -> Result<MoveApplied, SessionError> {
        let seat = self.pairing.seat_of(user).ok_or(SessionError::NotInGame)?;

        let outcome = self.game.make_move(seat, column).map_err(|e| {
            warn!(user, column, error = %e, "Invalid move");
            SessionError::from(e)
        })?;

        info!(
            user,
            row = outcome.row,
            column = outcome.column,
            status = ?outcome.status,
            "Move applied"
        );
        debug!(board = %self.game.board().display(), "Board after move");

        Ok(MoveApplied {
            outcome,
            snapshot: self.game.snapshot(),
        })
    }

    /// Clears the board for a new round. Pairing and seats are unchanged.
    #[instrument(skip(self), fields(pairing_id = %self.pairing.id()))]
    pub fn reset(&mut self) -> BoardSnapshot {
        self.game.reset();
        info!("Board reset");
        self.game.snapshot()
    }

    /// Rematch on behalf of `user`: only a member may ask, and only once the
    /// current round has ended.
    #[instrument(skip(self), fields(pairing_id = %self.pairing.id()))]
    pub fn rematch(&mut self, user: &str) -> Result<BoardSnapshot, SessionError> {
        if self.pairing.seat_of(user).is_none() {
            return Err(SessionError::NotInGame);
        }
        if !self.game.status().is_terminal() {
            debug!(user, "Rematch refused, round in progress");
            return Err(SessionError::RoundInProgress);
        }
        Ok(self.reset())
    }

    /// Human-readable result for a finished round.
    pub fn result_message(&self) -> Option<String> {
        match self.game.status() {
            GameStatus::InProgress => None,
            GameStatus::Won(seat) => Some(format!("{} wins!", self.pairing.name_of(seat))),
            GameStatus::Draw => Some("Game ended in a draw!".to_string()),
        }
    }
}

/// Requests processed by a session actor.
#[derive(Debug)]
pub enum SessionCommand {
    /// Drop a piece.
    Move {
        /// Requesting user.
        user: String,
        /// Requested column.
        column: i64,
        /// Where to send the result.
        reply: oneshot::Sender<Result<BoardSnapshot, SessionError>>,
    },
    /// Start a new round.
    Rematch {
        /// Requesting user.
        user: String,
        /// Where to send the result.
        reply: oneshot::Sender<Result<BoardSnapshot, SessionError>>,
    },
    /// Read the current state.
    Snapshot {
        /// Where to send the snapshot.
        reply: oneshot::Sender<BoardSnapshot>,
    },
    /// Stop the actor. Commands queued after this are dropped.
    Close {
        /// Signalled once the actor has stopped broadcasting.
        done: oneshot::Sender<()>,
    },
}

/// Cloneable address of a running session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pairing_id: PairingId,
    commands: mpsc::Sender<SessionCommand>,
    closed: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Returns the pairing this session belongs to.
    pub fn pairing_id(&self) -> PairingId {
        self.pairing_id
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }

    /// Asks the actor to apply a move.
    #[instrument(skip(self), fields(pairing_id = %self.pairing_id))]
    pub async fn apply_move(&self, user: &str, column: i64) -> Result<BoardSnapshot, SessionError> {
        let user = user.to_string();
        self.request(|reply| SessionCommand::Move { user, column, reply })
            .await?
    }

    /// Asks the actor for a rematch.
    #[instrument(skip(self), fields(pairing_id = %self.pairing_id))]
    pub async fn rematch(&self, user: &str) -> Result<BoardSnapshot, SessionError> {
        let user = user.to_string();
        self.request(|reply| SessionCommand::Rematch { user, reply })
            .await?
    }

    /// Reads the current board.
    pub async fn snapshot(&self) -> Result<BoardSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops the actor and waits until it has.
    ///
    /// Commands still queued are refused with [`SessionError::Closed`]
    /// without touching the board, so nothing reaches the pairing after
    /// this returns.
    #[instrument(skip(self), fields(pairing_id = %self.pairing_id))]
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let (done, stopped) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Close { done })
            .await
            .is_err()
        {
            debug!("Session already stopped");
            return;
        }
        // Dropped unanswered when the actor quit on an earlier command.
        let _ = stopped.await;
    }
}

/// Actor loop for one pairing.
#[instrument(skip_all, fields(pairing_id = %session.pairing().id()))]
async fn run_session(
    mut session: GameSession,
    mut commands: mpsc::Receiver<SessionCommand>,
    closed: Arc<AtomicBool>,
    broadcaster: Broadcaster,
) {
    let pairing = session.pairing().clone();
    if closed.load(Ordering::Acquire) {
        info!("Session closed before start");
        return;
    }

    for seat in Seat::iter() {
        let opponent = pairing.name_of(seat.opponent());
        broadcaster
            .send_to(pairing.name_of(seat), Envelope::game_started(opponent, seat))
            .await;
    }
    broadcaster
        .send_to_pairing(&pairing, Envelope::game_state(session.snapshot()))
        .await;
    info!(first = %pairing.first(), second = %pairing.second(), "Game started");

    while let Some(command) = commands.recv().await {
        if closed.load(Ordering::Acquire) {
            // Pending replies are dropped and surface as SessionError::Closed.
            if let SessionCommand::Close { done } = command {
                let _ = done.send(());
            }
            break;
        }
        match command {
            SessionCommand::Move {
                user,
                column,
                reply,
            } => {
                let result = session.apply_move(&user, column);
                if let Ok(applied) = &result {
                    broadcaster
                        .send_to_pairing(&pairing, Envelope::game_state(applied.snapshot.clone()))
                        .await;
                    if let Some(message) = session.result_message() {
                        info!(result = %message, "Game over");
                        broadcaster
                            .send_to_pairing(
                                &pairing,
                                Envelope::game_over(message, applied.snapshot.clone()),
                            )
                            .await;
                    }
                }
                let _ = reply.send(result.map(|applied| applied.snapshot));
            }
            SessionCommand::Rematch { user, reply } => {
                let result = session.rematch(&user);
                if let Ok(snapshot) = &result {
                    broadcaster
                        .send_to_pairing(&pairing, Envelope::server_chat("New game started!"))
                        .await;
                    broadcaster
                        .send_to_pairing(&pairing, Envelope::game_state(snapshot.clone()))
                        .await;
                    info!(requested_by = %user, "Rematch started");
                }
                let _ = reply.send(result);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(session.snapshot());
            }
            SessionCommand::Close { done } => {
                let _ = done.send(());
                break;
            }
        }
    }

    info!("Session closed");
}

/// All live sessions, keyed by pairing.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<PairingId, SessionHandle>>>,
    broadcaster: Broadcaster,
    capacity: usize,
}

impl SessionStore {
    /// Creates an empty store. `capacity` bounds each actor's command queue.
    #[instrument(skip(broadcaster))]
    pub fn new(broadcaster: Broadcaster, capacity: usize) -> Self {
        info!("Creating session store");
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            broadcaster,
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PairingId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the session actor for a new pairing.
    ///
    /// The actor immediately sends `GAME_STARTED` to each seat followed by
    /// the initial `GAME_STATE`. Must be called from within a tokio runtime.
    #[instrument(skip(self, pairing), fields(pairing_id = %pairing.id()))]
    pub fn open(&self, pairing: Pairing) -> SessionHandle {
        let (tx, rx) = mpsc::channel(self.capacity);
        let handle = SessionHandle {
            pairing_id: *pairing.id(),
            commands: tx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        self.lock().insert(*pairing.id(), handle.clone());
        tokio::spawn(run_session(
            GameSession::new(pairing),
            rx,
            handle.closed.clone(),
            self.broadcaster.clone(),
        ));
        handle
    }

    /// Returns the handle for a pairing's session.
    pub fn handle(&self, id: PairingId) -> Option<SessionHandle> {
        self.lock().get(&id).cloned()
    }

    /// Applies a move in a pairing's session.
    pub async fn apply_move(
        &self,
        id: PairingId,
        user: &str,
        column: i64,
    ) -> Result<BoardSnapshot, SessionError> {
        let handle = self.handle(id).ok_or(SessionError::NotInGame)?;
        handle.apply_move(user, column).await
    }

    /// Rematch in a pairing's session.
    pub async fn rematch(&self, id: PairingId, user: &str) -> Result<BoardSnapshot, SessionError> {
        let handle = self.handle(id).ok_or(SessionError::NotInGame)?;
        handle.rematch(user).await
    }

    /// Removes and stops a pairing's session, waiting for the actor to stop.
    /// Returns false if it was gone.
    #[instrument(skip(self))]
    pub async fn close(&self, id: PairingId) -> bool {
        let removed = self.lock().remove(&id);
        match removed {
            Some(handle) => {
                handle.close().await;
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{ConnectionHandle, UserDirectory};
    use crate::protocol::{MessageKind, Payload};
    use strictly_connect_four::{Cell, MoveError, ROWS};
    use tokio::sync::mpsc::Receiver;

    fn pairing() -> Pairing {
        Pairing::new(PairingId::next(), "alice".into(), "bob".into())
    }

    fn drain(rx: &mut Receiver<Envelope>) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(env) = rx.try_recv() {
            out.push(env);
        }
        out
    }

    struct Fixture {
        store: SessionStore,
        alice: Receiver<Envelope>,
        bob: Receiver<Envelope>,
    }

    fn fixture() -> Fixture {
        let directory = UserDirectory::new();
        let (a, alice) = ConnectionHandle::channel(32);
        let (b, bob) = ConnectionHandle::channel(32);
        directory.register("alice", a);
        directory.register("bob", b);
        Fixture {
            store: SessionStore::new(Broadcaster::new(directory), 8),
            alice,
            bob,
        }
    }

    #[test]
    fn test_apply_move_rejects_outsider() {
        let mut session = GameSession::new(pairing());
        assert_eq!(session.apply_move("carol", 0), Err(SessionError::NotInGame));
    }

    #[test]
    fn test_apply_move_enforces_turn() {
        let mut session = GameSession::new(pairing());
        let err = session.apply_move("bob", 0).unwrap_err();
        assert_eq!(
            err,
            SessionError::Move(MoveError::NotYourTurn { to_move: Seat::First })
        );
        let applied = session.apply_move("alice", 0).expect("legal");
        assert_eq!(applied.outcome.row, ROWS - 1);
        assert_eq!(applied.snapshot.current_seat, Seat::Second);
        assert_eq!(
            applied.snapshot.grid[ROWS - 1][0],
            Cell::Occupied(Seat::First)
        );
    }

    #[test]
    fn test_rematch_only_after_terminal() {
        let mut session = GameSession::new(pairing());
        assert_eq!(session.rematch("alice"), Err(SessionError::RoundInProgress));
        for (user, col) in [("alice", 0), ("bob", 0), ("alice", 1), ("bob", 1), ("alice", 2), ("bob", 2), ("alice", 3)] {
            session.apply_move(user, col).expect("legal");
        }
        assert_eq!(session.result_message().as_deref(), Some("alice wins!"));
        assert_eq!(session.rematch("carol"), Err(SessionError::NotInGame));
        let snap = session.rematch("bob").expect("rematch");
        assert_eq!(snap.status, GameStatus::InProgress);
        assert_eq!(snap.current_seat, Seat::First);
        assert_eq!(session.pairing().first(), "alice");
    }

    #[tokio::test]
    async fn test_open_announces_start_then_state() {
        let mut fx = fixture();
        let handle = fx.store.open(pairing());
        handle.snapshot().await.expect("running");

        let alice = drain(&mut fx.alice);
        let bob = drain(&mut fx.bob);
        assert_eq!(alice[0].kind, MessageKind::GameStarted);
        assert_eq!(alice[0].payload, Payload::Seat(Seat::First));
        assert_eq!(bob[0].payload, Payload::Seat(Seat::Second));
        assert!(bob[0].content.contains("against alice"));
        for msgs in [&alice, &bob] {
            assert_eq!(msgs[1].kind, MessageKind::GameState);
            let snap = msgs[1].snapshot().expect("board");
            assert_eq!(snap.current_seat, Seat::First);
            assert!(snap.grid.iter().flatten().all(|c| *c == Cell::Empty));
        }
    }

    #[tokio::test]
    async fn test_winning_move_sends_state_then_single_game_over() {
        let mut fx = fixture();
        let p = pairing();
        let id = *p.id();
        fx.store.open(p);
        for (user, col) in [("alice", 0), ("bob", 0), ("alice", 1), ("bob", 1), ("alice", 2), ("bob", 2)] {
            fx.store.apply_move(id, user, col).await.expect("legal");
        }
        drain(&mut fx.alice);
        drain(&mut fx.bob);

        let snap = fx.store.apply_move(id, "alice", 3).await.expect("legal");
        assert_eq!(snap.status, GameStatus::Won(Seat::First));
        for rx in [&mut fx.alice, &mut fx.bob] {
            let msgs = drain(rx);
            let kinds: Vec<_> = msgs.iter().map(|m| m.kind).collect();
            assert_eq!(kinds, vec![MessageKind::GameState, MessageKind::GameOver]);
            assert_eq!(msgs[1].content, "alice wins!");
        }

        let err = fx.store.apply_move(id, "bob", 4).await.unwrap_err();
        assert_eq!(err, SessionError::Move(MoveError::GameOver));
        assert!(drain(&mut fx.alice).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_move_broadcasts_nothing() {
        let mut fx = fixture();
        let p = pairing();
        let id = *p.id();
        let handle = fx.store.open(p);
        handle.snapshot().await.expect("running");
        drain(&mut fx.alice);
        drain(&mut fx.bob);

        assert!(fx.store.apply_move(id, "bob", 3).await.is_err());
        assert!(fx.store.apply_move(id, "alice", 9).await.is_err());
        assert!(drain(&mut fx.alice).is_empty());
        assert!(drain(&mut fx.bob).is_empty());
        let snap = handle.snapshot().await.expect("running");
        assert_eq!(snap.current_seat, Seat::First);
    }

    #[tokio::test]
    async fn test_concurrent_moves_serialized() {
        let fx = fixture();
        let p = pairing();
        let id = *p.id();
        fx.store.open(p);

        let a = {
            let store = fx.store.clone();
            tokio::spawn(async move { store.apply_move(id, "alice", 0).await })
        };
        let b = {
            let store = fx.store.clone();
            tokio::spawn(async move { store.apply_move(id, "alice", 1).await })
        };
        let results = [a.await.expect("join"), b.await.expect("join")];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    }

    #[tokio::test]
    async fn test_close_stops_session() {
        let fx = fixture();
        let p = pairing();
        let id = *p.id();
        let handle = fx.store.open(p);
        assert!(fx.store.close(id).await);
        assert!(!fx.store.close(id).await);
        assert!(fx.store.is_empty());
        assert_eq!(handle.apply_move("alice", 0).await, Err(SessionError::Closed));
        assert_eq!(
            fx.store.apply_move(id, "alice", 0).await,
            Err(SessionError::NotInGame)
        );
    }

    #[tokio::test]
    async fn test_move_queued_before_close_is_refused_silently() {
        let mut fx = fixture();
        let p = pairing();
        let id = *p.id();
        let handle = fx.store.open(p);
        handle.snapshot().await.expect("running");
        drain(&mut fx.alice);
        drain(&mut fx.bob);

        // Queued while the actor is parked, so it is still pending at close.
        let (reply, response) = oneshot::channel();
        handle
            .commands
            .try_send(SessionCommand::Move {
                user: "alice".into(),
                column: 3,
                reply,
            })
            .expect("queued");
        assert!(fx.store.close(id).await);

        assert!(handle.is_closed());
        assert!(response.await.is_err());
        assert!(drain(&mut fx.alice).is_empty());
        assert!(drain(&mut fx.bob).is_empty());
        assert_eq!(handle.snapshot().await, Err(SessionError::Closed));
    }
}
