//! User directory: display name to live connection.
//!
//! The directory is the source of truth for who is online. Each operation
//! takes the lock exactly once, so check-and-insert is atomic and no two
//! connections can ever hold the same name.

use crate::protocol::Envelope;
use derive_more::Display;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Opaque, process-unique connection identifier.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("conn-{}", _0)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Sending half of a connection's outbound queue.
///
/// The queue is bounded: [`ConnectionHandle::send`] waits while it is full.
/// Messages sent through one handle arrive in the order they were sent.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbox: mpsc::Sender<Envelope>,
}

impl ConnectionHandle {
    /// Wraps an outbox sender.
    pub fn new(id: ConnectionId, outbox: mpsc::Sender<Envelope>) -> Self {
        Self { id, outbox }
    }

    /// Creates a handle plus the receiving end of a fresh bounded queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(ConnectionId::next(), tx), rx)
    }

    /// Returns the connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues an envelope. Returns false if the connection is gone.
    #[instrument(skip(self, envelope), fields(connection_id = %self.id, kind = %envelope.kind))]
    pub async fn send(&self, envelope: Envelope) -> bool {
        match self.outbox.send(envelope).await {
            Ok(()) => true,
            Err(_) => {
                debug!("Outbox closed, dropping message");
                false
            }
        }
    }
}

/// Maps display names to connections.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: Arc<Mutex<HashMap<String, ConnectionHandle>>>,
}

impl UserDirectory {
    /// Creates an empty directory.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating user directory");
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ConnectionHandle>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds `name` to `connection`. Returns false if the name is taken.
    #[instrument(skip(self, connection), fields(connection_id = %connection.id()))]
    pub fn register(&self, name: &str, connection: ConnectionHandle) -> bool {
        let mut users = self.lock();
        if users.contains_key(name) {
            warn!(user = name, "Name already taken");
            return false;
        }
        users.insert(name.to_string(), connection);
        info!(user = name, online = users.len(), "User registered");
        true
    }

    /// Removes the binding for `name`. Idempotent.
    #[instrument(skip(self))]
    pub fn unregister(&self, name: &str) -> Option<ConnectionHandle> {
        let removed = self.lock().remove(name);
        if removed.is_some() {
            info!(user = name, "User unregistered");
        }
        removed
    }

    /// Removes `name` only if it is still bound to connection `id`.
    ///
    /// Returns true exactly once per binding, so callers can use it to gate
    /// one-time cleanup. A stale release never evicts a newer holder.
    #[instrument(skip(self))]
    pub fn release(&self, name: &str, id: ConnectionId) -> bool {
        let mut users = self.lock();
        match users.get(name) {
            Some(handle) if handle.id() == id => {
                users.remove(name);
                info!(user = name, online = users.len(), "User released");
                true
            }
            _ => {
                debug!(user = name, "Binding already gone");
                false
            }
        }
    }

    /// Finds the connection for `name`.
    #[instrument(skip(self))]
    pub fn lookup(&self, name: &str) -> Option<ConnectionHandle> {
        self.lock().get(name).cloned()
    }

    /// Returns true if `name` is bound to connection `id`.
    pub fn is_bound_to(&self, name: &str, id: ConnectionId) -> bool {
        self.lock().get(name).is_some_and(|handle| handle.id() == id)
    }

    /// Returns true if `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Returns all bindings, optionally excluding one name.
    pub fn handles_except(&self, exclude: Option<&str>) -> Vec<(String, ConnectionHandle)> {
        self.lock()
            .iter()
            .filter(|(name, _)| Some(name.as_str()) != exclude)
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect()
    }

    /// Returns the online names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of users online.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nobody is online.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
