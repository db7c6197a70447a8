//! Matchmaking: the waiting queue and the pairing table.
//!
//! Per-user state machine driven by game requests:
//!
//! - idle → waiting (nobody else waiting)
//! - waiting → idle (same user requests again: cancel)
//! - waiting(A) + request(B) → paired(A as seat one, B as seat two)
//! - paired → idle (quit or disconnect of either member)
//!
//! The queue is a true FIFO: the longest-waiting user is matched first.

use derive_getters::Getters;
use derive_more::Display;
use derive_new::new;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strictly_connect_four::Seat;
use tracing::{debug, info, instrument};

/// Process-unique pairing identifier.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("pairing-{}", _0)]
pub struct PairingId(u64);

impl PairingId {
    /// Allocates the next id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Two opponents with a fixed seat order.
#[derive(Debug, Clone, PartialEq, Eq, Getters, new)]
pub struct Pairing {
    /// Pairing id.
    id: PairingId,
    /// Seat one: the user who was waiting.
    first: String,
    /// Seat two: the user whose request completed the match.
    second: String,
}

impl Pairing {
    /// Returns the seat `user` occupies.
    pub fn seat_of(&self, user: &str) -> Option<Seat> {
        if self.first == user {
            Some(Seat::First)
        } else if self.second == user {
            Some(Seat::Second)
        } else {
            None
        }
    }

    /// Returns the user sitting in `seat`.
    pub fn name_of(&self, seat: Seat) -> &str {
        match seat {
            Seat::First => &self.first,
            Seat::Second => &self.second,
        }
    }

    /// Returns `user`'s opponent.
    pub fn opponent_of(&self, user: &str) -> Option<&str> {
        self.seat_of(user).map(|seat| self.name_of(seat.opponent()))
    }
}

/// Result of a game request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Queued; nobody else was waiting.
    Waiting,
    /// The user was waiting and is now idle again.
    Cancelled,
    /// Matched with the longest-waiting user.
    Paired(Pairing),
    /// The user already has a pairing; nothing changed.
    AlreadyPaired,
}

#[derive(Debug, Default)]
struct MatchState {
    waiting: VecDeque<String>,
    by_user: HashMap<String, PairingId>,
    pairings: HashMap<PairingId, Pairing>,
}

impl MatchState {
    fn dissolve(&mut self, user: &str) -> Option<Pairing> {
        let id = self.by_user.get(user).copied()?;
        let pairing = self.pairings.remove(&id)?;
        self.by_user.remove(&pairing.first);
        self.by_user.remove(&pairing.second);
        info!(pairing_id = %id, "Pairing dissolved");
        Some(pairing)
    }
}

/// Owns the waiting queue and all active pairings.
#[derive(Debug, Clone, Default)]
pub struct Matchmaker {
    state: Arc<Mutex<MatchState>>,
}

impl Matchmaker {
    /// Creates an empty matchmaker.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating matchmaker");
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handles a game request from `user`.
    #[instrument(skip(self))]
    pub fn request(&self, user: &str) -> MatchOutcome {
        let mut state = self.lock();

        if state.by_user.contains_key(user) {
            debug!(user, "Already paired");
            return MatchOutcome::AlreadyPaired;
        }

        if let Some(pos) = state.waiting.iter().position(|w| w == user) {
            state.waiting.remove(pos);
            info!(user, "Game request canceled");
            return MatchOutcome::Cancelled;
        }

        match state.waiting.pop_front() {
            Some(opponent) => {
                let pairing = Pairing::new(PairingId::next(), opponent, user.to_string());
                state.by_user.insert(pairing.first.clone(), pairing.id);
                state.by_user.insert(pairing.second.clone(), pairing.id);
                state.pairings.insert(pairing.id, pairing.clone());
                info!(
                    pairing_id = %pairing.id,
                    first = %pairing.first,
                    second = %pairing.second,
                    "Players paired"
                );
                MatchOutcome::Paired(pairing)
            }
            None => {
                state.waiting.push_back(user.to_string());
                info!(user, "Waiting for an opponent");
                MatchOutcome::Waiting
            }
        }
    }

    /// Returns the pairing `user` belongs to.
    #[instrument(skip(self))]
    pub fn pairing_of(&self, user: &str) -> Option<Pairing> {
        let state = self.lock();
        state
            .by_user
            .get(user)
            .and_then(|id| state.pairings.get(id))
            .cloned()
    }

    /// Destroys `user`'s pairing, freeing both members.
    ///
    /// Returns the pairing to exactly one caller; later calls for either
    /// member return `None`.
    #[instrument(skip(self))]
    pub fn dissolve(&self, user: &str) -> Option<Pairing> {
        self.lock().dissolve(user)
    }

    /// Takes `user` out of matchmaking entirely: out of the waiting queue and
    /// out of any pairing, under one lock.
    ///
    /// A concurrent [`request`](Self::request) either pairs with `user` first
    /// (and the pairing is returned here) or finds them gone.
    #[instrument(skip(self))]
    pub fn remove_user(&self, user: &str) -> Option<Pairing> {
        let mut state = self.lock();
        if let Some(pos) = state.waiting.iter().position(|w| w == user) {
            state.waiting.remove(pos);
            debug!(user, "Left waiting queue");
        }
        state.dissolve(user)
    }

    /// Returns true if `user` is in the waiting queue.
    pub fn is_waiting(&self, user: &str) -> bool {
        self.lock().waiting.iter().any(|w| w == user)
    }

    /// Returns the waiting users, longest-waiting first.
    pub fn waiting(&self) -> Vec<String> {
        self.lock().waiting.iter().cloned().collect()
    }

    /// Number of active pairings.
    pub fn active_pairings(&self) -> usize {
        self.lock().pairings.len()
    }
}
