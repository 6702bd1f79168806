//! Storage abstraction for the deaddrop relay
//!
//! Trait-based abstraction for persisting envelopes and identities. The
//! trait is synchronous; the relay layer owns all waiting and retry
//! behavior, so backends stay simple ordered maps.

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::ChaoticStorage;
use deaddrop_proto::{Envelope, EnvelopeDraft, EnvelopeId, Identity, UserId};
pub use error::StorageError;
pub use memory::MemoryStorage;

pub use self::redb::RedbStorage;

/// Storage abstraction for envelopes and identities
///
/// Must be Clone (shared across relay handles), Send + Sync (thread-safe),
/// and synchronous (no async methods). Implementations typically share
/// internal state via Arc, so clones access the same underlying storage.
///
/// Envelopes are append-only: ids are assigned densely starting at 1, and
/// no operation removes or rewrites a stored envelope.
///
/// # Panics
///
/// Backends guarding shared state with a mutex may panic when that mutex
/// is poisoned. A poisoned lock means another thread panicked mid-write,
/// and continuing on the torn state would corrupt the envelope log.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Persist a draft and assign it the next envelope id.
    ///
    /// # Invariants
    ///
    /// - Post: returned id equals the previous `last_id` plus one
    /// - Post: the envelope is durable before this returns
    fn append(&self, draft: &EnvelopeDraft, created_at: u64) -> Result<EnvelopeId, StorageError>;

    /// The `limit` most recent envelopes, oldest first.
    ///
    /// Returns everything when fewer than `limit` envelopes exist.
    fn newest(&self, limit: usize) -> Result<Vec<Envelope>, StorageError>;

    /// Every envelope with id greater than `cursor`, ascending.
    ///
    /// `cursor` 0 returns the full log. A cursor at or past `last_id`
    /// returns an empty batch.
    fn after(&self, cursor: EnvelopeId) -> Result<Vec<Envelope>, StorageError>;

    /// Highest assigned envelope id. 0 when nothing is stored.
    fn last_id(&self) -> Result<EnvelopeId, StorageError>;

    /// Total number of stored envelopes.
    fn envelope_count(&self) -> Result<usize, StorageError>;

    /// Insert or replace the identity record for `identity.user_id`.
    fn upsert_identity(&self, identity: &Identity) -> Result<(), StorageError>;

    /// Every registered identity, ascending by user id.
    fn identities(&self) -> Result<Vec<Identity>, StorageError>;

    /// Replace the public key of an already registered user.
    ///
    /// Returns the updated record, or [`StorageError::UnknownUser`] if the
    /// user has never been registered.
    fn publish_key(&self, user_id: UserId, public_key: &str) -> Result<Identity, StorageError>;
}
