//! Relay service layer over pluggable storage.
//!
//! [`Relay`] is what clients talk to: it implements the client-facing
//! [`RelayStore`] trait in-process, stamps store-assigned timestamps, and
//! turns backend failures into the client error taxonomy. The relay never
//! inspects envelope contents; every stored byte of ciphertext is opaque
//! to it.

use std::time::Duration;

use async_trait::async_trait;
use deaddrop_core::{Environment, RelayStore, StoreError};
use deaddrop_proto::{Envelope, EnvelopeDraft, EnvelopeId, Identity, UserId};

use crate::storage::{Storage, StorageError};

/// Tuning knobs for the relay's blocking poll.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Longest a poll waits for new envelopes before returning empty.
    ///
    /// Bounds both client-perceived latency and how long a relay pins
    /// resources for an idle poller.
    pub poll_wait: Duration,

    /// How often a waiting poll re-checks storage.
    pub poll_check_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_wait: Duration::from_secs(30),
            poll_check_interval: Duration::from_millis(250),
        }
    }
}

/// Service layer exposing storage through the client store trait.
///
/// Generic over storage backend and environment; time for poll deadlines
/// and `created_at` stamps comes from the environment, so the relay runs
/// identically under the system clock and under simulation.
#[derive(Clone)]
pub struct Relay<S, E> {
    storage: S,
    env: E,
    config: RelayConfig,
}

impl<S: Storage, E: Environment> Relay<S, E> {
    /// Create a relay with default poll timing.
    pub fn new(storage: S, env: E) -> Self {
        Self::with_config(storage, env, RelayConfig::default())
    }

    /// Create a relay with explicit poll timing.
    pub fn with_config(storage: S, env: E, config: RelayConfig) -> Self {
        Self { storage, env, config }
    }

    /// Direct access to the backend (for recovery checks and tests).
    pub fn storage(&self) -> &S {
        &self.storage
    }
}

/// Map a backend failure onto the client-facing error taxonomy.
///
/// Backend refusals (`UnknownUser`, `IdOverflow`) become rejections that
/// retrying cannot fix; I/O and serialization failures become
/// `Unavailable`, which callers treat as transient.
fn store_error(operation: &'static str, err: StorageError) -> StoreError {
    match err {
        StorageError::UnknownUser { user_id } => {
            StoreError::Rejected { operation, reason: format!("user {user_id} is not registered") }
        },
        StorageError::IdOverflow => {
            StoreError::Rejected { operation, reason: "envelope id space exhausted".to_string() }
        },
        StorageError::Io(reason) | StorageError::Serialization(reason) => {
            StoreError::Unavailable { reason }
        },
    }
}

#[async_trait]
impl<S: Storage, E: Environment> RelayStore for Relay<S, E> {
    async fn append(&self, draft: EnvelopeDraft) -> Result<EnvelopeId, StoreError> {
        let created_at = self.env.wall_clock_millis();

        let id = self.storage.append(&draft, created_at).map_err(|err| {
            tracing::error!(sender_id = draft.sender_id, %err, "envelope append failed");
            store_error("append", err)
        })?;

        tracing::debug!(
            envelope_id = id,
            sender_id = draft.sender_id,
            recipient_id = ?draft.recipient_id,
            "envelope appended"
        );

        Ok(id)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Envelope>, StoreError> {
        self.storage.newest(limit).map_err(|err| {
            tracing::error!(%err, "history read failed");
            store_error("recent", err)
        })
    }

    async fn poll(&self, cursor: EnvelopeId) -> Result<Vec<Envelope>, StoreError> {
        let started = self.env.now();

        loop {
            let batch = self.storage.after(cursor).map_err(|err| {
                tracing::error!(cursor, %err, "poll read failed");
                store_error("poll", err)
            })?;

            if !batch.is_empty() {
                return Ok(batch);
            }

            if self.env.now() - started >= self.config.poll_wait {
                return Ok(Vec::new());
            }

            self.env.sleep(self.config.poll_check_interval).await;
        }
    }

    async fn identities(&self) -> Result<Vec<Identity>, StoreError> {
        self.storage.identities().map_err(|err| {
            tracing::error!(%err, "identity read failed");
            store_error("identities", err)
        })
    }

    async fn publish_identity(&self, identity: Identity) -> Result<Identity, StoreError> {
        self.storage.upsert_identity(&identity).map_err(|err| {
            tracing::error!(user_id = identity.user_id, %err, "identity publish failed");
            store_error("publish_identity", err)
        })?;

        tracing::info!(user_id = identity.user_id, "identity published");

        Ok(identity)
    }

    async fn publish_key(&self, user_id: UserId, public_key: &str) -> Result<Identity, StoreError> {
        let updated = self.storage.publish_key(user_id, public_key).map_err(|err| {
            tracing::error!(user_id, %err, "key publish failed");
            store_error("publish_key", err)
        })?;

        tracing::info!(user_id, "public key rotated");

        Ok(updated)
    }
}
