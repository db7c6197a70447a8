//! Outbound routing: one user, one pairing, or everyone online.
//!
//! The broadcaster is the only path by which messages leave the core.
//! It resolves recipients through the [`UserDirectory`], releases the
//! directory lock, and only then awaits the (possibly full) outboxes.

use crate::directory::UserDirectory;
use crate::matchmaker::Pairing;
use crate::protocol::Envelope;
use tracing::{debug, instrument};

/// Delivers envelopes to connected users.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    directory: UserDirectory,
}

impl Broadcaster {
    /// Creates a broadcaster over a directory.
    pub fn new(directory: UserDirectory) -> Self {
        Self { directory }
    }

    /// Returns the directory recipients are resolved from.
    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    /// Sends to one user. Returns false if the user is not online.
    #[instrument(skip(self, envelope), fields(kind = %envelope.kind))]
    pub async fn send_to(&self, user: &str, envelope: Envelope) -> bool {
        match self.directory.lookup(user) {
            Some(handle) => handle.send(envelope).await,
            None => {
                debug!(user, "Recipient not online");
                false
            }
        }
    }

    /// Sends to both seats of a pairing, seat one first.
    #[instrument(skip(self, pairing, envelope), fields(pairing_id = %pairing.id(), kind = %envelope.kind))]
    pub async fn send_to_pairing(&self, pairing: &Pairing, envelope: Envelope) {
        self.send_to(pairing.first(), envelope.clone()).await;
        self.send_to(pairing.second(), envelope).await;
    }

    /// Sends to every user online except `exclude`. Returns the count reached.
    #[instrument(skip(self, envelope), fields(kind = %envelope.kind))]
    pub async fn broadcast_all(&self, envelope: Envelope, exclude: Option<&str>) -> usize {
        let recipients = self.directory.handles_except(exclude);
        let mut delivered = 0;
        for (_, handle) in recipients {
            if handle.send(envelope.clone()).await {
                delivered += 1;
            }
        }
        debug!(delivered, "Broadcast complete");
        delivered
    }
}
