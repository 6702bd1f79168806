//! Client-facing relay store boundary.
//!
//! Everything the client ever asks of a relay fits in six operations, and
//! all of them speak opaque envelopes. The trait is implemented in-process
//! by the server crate's relay for simulation and by any future transport
//! client, which keeps session logic independent of how bytes move.

use async_trait::async_trait;
use deaddrop_proto::{Envelope, EnvelopeDraft, EnvelopeId, Identity, UserId};

use crate::error::StoreError;

/// Relay operations as the client sees them.
///
/// Implementations are cheap to clone and shared across poll workers and
/// fan-out tasks. No read isolation is promised beyond "observe the latest
/// durable state"; the synchronizer's merge rules absorb overlap and
/// reordering between batches.
#[async_trait]
pub trait RelayStore: Clone + Send + Sync + 'static {
    /// Append one envelope copy.
    ///
    /// The store assigns the id and `created_at` timestamp. The copy is
    /// durable before the id comes back.
    async fn append(&self, draft: EnvelopeDraft) -> Result<EnvelopeId, StoreError>;

    /// The most recent `limit` envelopes in append order.
    async fn recent(&self, limit: usize) -> Result<Vec<Envelope>, StoreError>;

    /// Envelopes with id greater than `cursor`, ascending.
    ///
    /// May block server-side until new envelopes exist or a bounded wait
    /// elapses; an empty batch means the wait timed out.
    async fn poll(&self, cursor: EnvelopeId) -> Result<Vec<Envelope>, StoreError>;

    /// Every registered identity, including the caller's.
    async fn identities(&self) -> Result<Vec<Identity>, StoreError>;

    /// Insert or update the caller's directory entry.
    ///
    /// Returns the stored entry. Publishing an existing `user_id`
    /// overwrites the display name and public key; readers observe the
    /// change on their next `identities` call.
    async fn publish_identity(&self, identity: Identity) -> Result<Identity, StoreError>;

    /// Replace the public key of an already registered user.
    ///
    /// Unlike [`RelayStore::publish_identity`] this never registers
    /// anyone: rotating the key of an unknown `user_id` is a rejection.
    async fn publish_key(&self, user_id: UserId, public_key: &str)
    -> Result<Identity, StoreError>;
}
