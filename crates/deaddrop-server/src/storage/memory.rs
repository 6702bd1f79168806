//! In-memory storage implementation
//!
//! Vec and HashMap backed storage for testing and development. Data is lost
//! on restart.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use deaddrop_proto::{Envelope, EnvelopeDraft, EnvelopeId, Identity, UserId};

use super::{Storage, StorageError};

/// In-memory storage for testing
///
/// Uses Arc<Mutex<>> so clones share the same underlying storage, matching
/// the behavior of persistent storage implementations.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

struct MemoryStorageInner {
    /// Envelopes in append order. Ids are dense and start at 1, so the
    /// envelope with id `n` sits at index `n - 1`.
    envelopes: Vec<Envelope>,
    identities: HashMap<UserId, Identity>,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStorageInner {
                envelopes: Vec::new(),
                identities: HashMap::new(),
            })),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    /// Append an envelope with the next dense id.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    fn append(&self, draft: &EnvelopeDraft, created_at: u64) -> Result<EnvelopeId, StorageError> {
        #[allow(clippy::expect_used)]
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let last = inner.envelopes.last().map_or(0, |envelope| envelope.id);
        let id = last.checked_add(1).ok_or(StorageError::IdOverflow)?;
        inner.envelopes.push(draft.clone().into_envelope(id, created_at));
        debug_assert_eq!(inner.envelopes.len() as u64, id);

        Ok(id)
    }

    /// The `limit` most recent envelopes, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    fn newest(&self, limit: usize) -> Result<Vec<Envelope>, StorageError> {
        #[allow(clippy::expect_used)]
        let inner = self.inner.lock().expect("Mutex poisoned");

        let skip = inner.envelopes.len().saturating_sub(limit);
        Ok(inner.envelopes[skip..].to_vec())
    }

    /// Envelopes with id greater than `cursor`, ascending.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    fn after(&self, cursor: EnvelopeId) -> Result<Vec<Envelope>, StorageError> {
        #[allow(clippy::expect_used)]
        let inner = self.inner.lock().expect("Mutex poisoned");

        // Dense ids: the first envelope past `cursor` sits at index `cursor`.
        let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(inner.envelopes.len());
        Ok(inner.envelopes[start..].to_vec())
    }

    /// Highest assigned envelope id. 0 when nothing is stored.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    fn last_id(&self) -> Result<EnvelopeId, StorageError> {
        #[allow(clippy::expect_used)]
        let inner = self.inner.lock().expect("Mutex poisoned");

        Ok(inner.envelopes.last().map_or(0, |envelope| envelope.id))
    }

    /// Total number of stored envelopes.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    fn envelope_count(&self) -> Result<usize, StorageError> {
        #[allow(clippy::expect_used)]
        let inner = self.inner.lock().expect("Mutex poisoned");

        Ok(inner.envelopes.len())
    }

    /// Insert or replace an identity record.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    fn upsert_identity(&self, identity: &Identity) -> Result<(), StorageError> {
        #[allow(clippy::expect_used)]
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        inner.identities.insert(identity.user_id, identity.clone());
        Ok(())
    }

    /// Every registered identity, ascending by user id.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    fn identities(&self) -> Result<Vec<Identity>, StorageError> {
        #[allow(clippy::expect_used)]
        let inner = self.inner.lock().expect("Mutex poisoned");

        let mut all: Vec<Identity> = inner.identities.values().cloned().collect();
        all.sort_unstable_by_key(|identity| identity.user_id);
        Ok(all)
    }

    /// Replace the public key of a registered user.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned
    fn publish_key(&self, user_id: UserId, public_key: &str) -> Result<Identity, StorageError> {
        #[allow(clippy::expect_used)]
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let identity = inner
            .identities
            .get_mut(&user_id)
            .ok_or(StorageError::UnknownUser { user_id })?;
        identity.public_key = public_key.to_string();
        Ok(identity.clone())
    }
}

#[cfg(test)]
mod tests {
    use deaddrop_proto::Audience;

    use super::*;

    fn create_test_draft(sender_id: u64, recipient_id: Option<u64>) -> EnvelopeDraft {
        EnvelopeDraft {
            sender_id,
            sender_display_name: format!("user-{sender_id}"),
            recipient_id,
            audience: Audience::Broadcast,
            ciphertext: vec![0xAA; 24],
            wrapped_key: vec![0xBB; 16],
            nonce: vec![0xCC; 12],
        }
    }

    fn create_test_identity(user_id: u64) -> Identity {
        Identity {
            user_id,
            display_name: format!("user-{user_id}"),
            public_key: format!("key-{user_id}"),
        }
    }

    #[test]
    fn test_new_storage_is_empty() {
        let storage = MemoryStorage::new();

        assert_eq!(storage.last_id().unwrap(), 0);
        assert_eq!(storage.envelope_count().unwrap(), 0);
        assert!(storage.newest(10).unwrap().is_empty());
        assert!(storage.after(0).unwrap().is_empty());
        assert!(storage.identities().unwrap().is_empty());
    }

    #[test]
    fn test_append_assigns_sequential_ids() {
        let storage = MemoryStorage::new();

        for expected in 1..=3 {
            let id = storage.append(&create_test_draft(1, None), 500).unwrap();
            assert_eq!(id, expected);
        }

        assert_eq!(storage.last_id().unwrap(), 3);
        assert_eq!(storage.envelope_count().unwrap(), 3);
    }

    #[test]
    fn test_append_stamps_created_at() {
        let storage = MemoryStorage::new();
        storage.append(&create_test_draft(1, Some(2)), 1_234).unwrap();

        let stored = &storage.after(0).unwrap()[0];
        assert_eq!(stored.created_at, 1_234);
        assert_eq!(stored.recipient_id, Some(2));
    }

    #[test]
    fn test_newest_returns_tail() {
        let storage = MemoryStorage::new();
        for _ in 0..5 {
            storage.append(&create_test_draft(1, None), 500).unwrap();
        }

        let tail = storage.newest(2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].id, 4);
        assert_eq!(tail[1].id, 5);

        assert_eq!(storage.newest(100).unwrap().len(), 5);
    }

    #[test]
    fn test_after_cursor_filters() {
        let storage = MemoryStorage::new();
        for _ in 0..4 {
            storage.append(&create_test_draft(1, None), 500).unwrap();
        }

        let batch = storage.after(2).unwrap();
        assert_eq!(batch.iter().map(|envelope| envelope.id).collect::<Vec<_>>(), vec![3, 4]);

        assert_eq!(storage.after(0).unwrap().len(), 4);
        assert!(storage.after(4).unwrap().is_empty());
    }

    #[test]
    fn test_after_cursor_past_end_is_empty() {
        let storage = MemoryStorage::new();
        storage.append(&create_test_draft(1, None), 500).unwrap();

        assert!(storage.after(10).unwrap().is_empty());
        assert!(storage.after(u64::MAX).unwrap().is_empty());
    }

    #[test]
    fn test_identities_sorted_by_user_id() {
        let storage = MemoryStorage::new();
        storage.upsert_identity(&create_test_identity(30)).unwrap();
        storage.upsert_identity(&create_test_identity(10)).unwrap();
        storage.upsert_identity(&create_test_identity(20)).unwrap();

        let ids: Vec<u64> =
            storage.identities().unwrap().iter().map(|identity| identity.user_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let storage = MemoryStorage::new();
        storage.upsert_identity(&create_test_identity(1)).unwrap();

        let mut updated = create_test_identity(1);
        updated.display_name = "renamed".to_string();
        storage.upsert_identity(&updated).unwrap();

        let all = storage.identities().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].display_name, "renamed");
    }

    #[test]
    fn test_publish_key_updates_registered_user() {
        let storage = MemoryStorage::new();
        storage.upsert_identity(&create_test_identity(7)).unwrap();

        let updated = storage.publish_key(7, "rotated").unwrap();
        assert_eq!(updated.public_key, "rotated");
        assert_eq!(storage.identities().unwrap()[0].public_key, "rotated");
    }

    #[test]
    fn test_publish_key_rejects_unknown_user() {
        let storage = MemoryStorage::new();

        let err = storage.publish_key(99, "key").unwrap_err();
        assert_eq!(err, StorageError::UnknownUser { user_id: 99 });
    }

    #[test]
    fn test_clones_share_state() {
        let storage = MemoryStorage::new();
        let clone = storage.clone();

        storage.append(&create_test_draft(1, None), 500).unwrap();

        assert_eq!(clone.last_id().unwrap(), 1);
    }
}
