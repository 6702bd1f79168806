//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. The
//! envelope log and identity directory survive relay restarts, and id
//! assignment resumes from the highest stored id.

use std::{path::Path, sync::Arc};

use deaddrop_proto::{Envelope, EnvelopeDraft, EnvelopeId, Identity, UserId};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use super::{Storage, StorageError};

/// Table: envelopes
/// Key: envelope id as big-endian bytes [8 bytes]
/// Value: CBOR-encoded Envelope
const ENVELOPES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("envelopes");

/// Table: identities
/// Key: user id as big-endian bytes [8 bytes]
/// Value: CBOR-encoded Identity
const IDENTITIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("identities");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (ENVELOPES, IDENTITIES).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(ENVELOPES).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(IDENTITIES).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Highest envelope id present in the table, 0 when empty.
    fn compute_last_id<T: ReadableTable<&'static [u8], &'static [u8]>>(
        &self,
        table: &T,
    ) -> Result<EnvelopeId, StorageError> {
        match table.iter().map_err(|e| StorageError::Io(e.to_string()))?.next_back() {
            Some(result) => {
                let (key, _) = result.map_err(|e| StorageError::Io(e.to_string()))?;
                decode_envelope_key(key.value())
            }
            None => Ok(0),
        }
    }
}

impl Storage for RedbStorage {
    fn append(&self, draft: &EnvelopeDraft, created_at: u64) -> Result<EnvelopeId, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        let id = {
            let mut table =
                txn.open_table(ENVELOPES).map_err(|e| StorageError::Io(e.to_string()))?;

            let last = self.compute_last_id(&table)?;
            let id = last.checked_add(1).ok_or(StorageError::IdOverflow)?;
            let envelope = draft.clone().into_envelope(id, created_at);

            let mut bytes = Vec::new();
            ciborium::into_writer(&envelope, &mut bytes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;

            let key = encode_envelope_key(id);
            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;

            id
        };

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(id)
    }

    fn newest(&self, limit: usize) -> Result<Vec<Envelope>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;

        let table = txn.open_table(ENVELOPES).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut envelopes = Vec::with_capacity(limit);
        let results = table.iter().map_err(|e| StorageError::Io(e.to_string()))?;

        // Walk from the newest key backwards, then restore ascending order.
        for result in results.rev().take(limit) {
            let (_, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            let envelope: Envelope = ciborium::from_reader(value.value())
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            envelopes.push(envelope);
        }
        envelopes.reverse();

        Ok(envelopes)
    }

    fn after(&self, cursor: EnvelopeId) -> Result<Vec<Envelope>, StorageError> {
        let Some(first) = cursor.checked_add(1) else {
            return Ok(Vec::new());
        };

        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;

        let table = txn.open_table(ENVELOPES).map_err(|e| StorageError::Io(e.to_string()))?;

        let start_key = encode_envelope_key(first);
        let results = table
            .range(start_key.as_slice()..)
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let mut envelopes = Vec::new();
        for result in results {
            let (_, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            let envelope: Envelope = ciborium::from_reader(value.value())
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            envelopes.push(envelope);
        }

        Ok(envelopes)
    }

    fn last_id(&self) -> Result<EnvelopeId, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(ENVELOPES).map_err(|e| StorageError::Io(e.to_string()))?;

        self.compute_last_id(&table)
    }

    fn envelope_count(&self) -> Result<usize, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(ENVELOPES).map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(table.len().map_err(|e| StorageError::Io(e.to_string()))? as usize)
    }

    fn upsert_identity(&self, identity: &Identity) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(IDENTITIES).map_err(|e| StorageError::Io(e.to_string()))?;

            let mut bytes = Vec::new();
            ciborium::into_writer(identity, &mut bytes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;

            let key = encode_identity_key(identity.user_id);
            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn identities(&self) -> Result<Vec<Identity>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;

        let table = txn.open_table(IDENTITIES).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut identities = Vec::new();

        // Big-endian keys iterate in ascending user id order.
        for result in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (_, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            let identity: Identity = ciborium::from_reader(value.value())
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            identities.push(identity);
        }

        Ok(identities)
    }

    fn publish_key(&self, user_id: UserId, public_key: &str) -> Result<Identity, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        let updated = {
            let mut table =
                txn.open_table(IDENTITIES).map_err(|e| StorageError::Io(e.to_string()))?;

            let key = encode_identity_key(user_id);

            let mut identity: Identity =
                match table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))? {
                    Some(value) => ciborium::from_reader(value.value())
                        .map_err(|e| StorageError::Serialization(e.to_string()))?,
                    None => return Err(StorageError::UnknownUser { user_id }),
                };

            identity.public_key = public_key.to_string();

            let mut bytes = Vec::new();
            ciborium::into_writer(&identity, &mut bytes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;

            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;

            identity
        };

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(updated)
    }
}

/// Encode an envelope id as an 8-byte big-endian key.
///
/// Big-endian ensures lexicographic ordering matches numeric ordering.
fn encode_envelope_key(id: EnvelopeId) -> [u8; 8] {
    id.to_be_bytes()
}

/// Decode an envelope key back to its id.
fn decode_envelope_key(key: &[u8]) -> Result<EnvelopeId, StorageError> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| StorageError::Serialization("envelope key is not 8 bytes".to_string()))?;
    Ok(EnvelopeId::from_be_bytes(bytes))
}

/// Encode a user id as an 8-byte big-endian key.
fn encode_identity_key(user_id: UserId) -> [u8; 8] {
    user_id.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use deaddrop_proto::Audience;
    use tempfile::tempdir;

    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_envelope_key_encoding() {
        let id: EnvelopeId = 0x1234_5678_9ABC_DEF0;

        let key = encode_envelope_key(id);
        assert_eq!(key.len(), 8);
        assert_eq!(decode_envelope_key(&key).unwrap(), id);
    }

    #[test]
    fn test_envelope_key_rejects_wrong_length() {
        assert!(decode_envelope_key(&[0u8; 4]).is_err());
    }

    fn create_test_draft(sender_id: u64, recipient_id: Option<u64>) -> EnvelopeDraft {
        EnvelopeDraft {
            sender_id,
            sender_display_name: format!("user-{sender_id}"),
            recipient_id,
            audience: Audience::Direct,
            ciphertext: vec![0x11; 32],
            wrapped_key: vec![0x22; 64],
            nonce: vec![0x33; 12],
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
    fn test_append_assigns_sequential_ids() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        for expected in 1..=3 {
            let id = storage.append(&create_test_draft(1, Some(2)), 500).unwrap();
            assert_eq!(id, expected);
        }

        assert_eq!(storage.last_id().unwrap(), 3);
        assert_eq!(storage.envelope_count().unwrap(), 3);
    }

    #[test]
    fn test_envelope_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        let draft = create_test_draft(7, Some(9));
        let id = storage.append(&draft, 1_234).unwrap();

        let loaded = storage.after(0).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], draft.into_envelope(id, 1_234));
    }

    #[test]
    fn test_ids_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");

        {
            let storage = RedbStorage::open(&path).unwrap();
            storage.append(&create_test_draft(1, None), 100).unwrap();
            storage.append(&create_test_draft(2, None), 200).unwrap();
        }

        let reopened = RedbStorage::open(&path).unwrap();
        assert_eq!(reopened.last_id().unwrap(), 2);

        let id = reopened.append(&create_test_draft(3, None), 300).unwrap();
        assert_eq!(id, 3);
        assert_eq!(reopened.envelope_count().unwrap(), 3);
    }

    #[test]
    fn test_after_cursor_pagination() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        for _ in 0..5 {
            storage.append(&create_test_draft(1, None), 500).unwrap();
        }

        let batch = storage.after(3).unwrap();
        assert_eq!(batch.iter().map(|envelope| envelope.id).collect::<Vec<_>>(), vec![4, 5]);

        assert_eq!(storage.after(0).unwrap().len(), 5);
        assert!(storage.after(5).unwrap().is_empty());
        assert!(storage.after(u64::MAX).unwrap().is_empty());
    }

    #[test]
    fn test_newest_returns_tail_ascending() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        for _ in 0..5 {
            storage.append(&create_test_draft(1, None), 500).unwrap();
        }

        let tail = storage.newest(3).unwrap();
        assert_eq!(tail.iter().map(|envelope| envelope.id).collect::<Vec<_>>(), vec![3, 4, 5]);

        assert_eq!(storage.newest(100).unwrap().len(), 5);
    }

    #[test]
    fn test_identities_sorted_by_user_id() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        for user_id in [300u64, 100, 200] {
            storage.upsert_identity(&create_test_identity(user_id)).unwrap();
        }

        let ids: Vec<u64> =
            storage.identities().unwrap().iter().map(|identity| identity.user_id).collect();
        assert_eq!(ids, vec![100, 200, 300]);
    }

    #[test]
    fn test_identities_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");

        {
            let storage = RedbStorage::open(&path).unwrap();
            storage.upsert_identity(&create_test_identity(1)).unwrap();
        }

        let reopened = RedbStorage::open(&path).unwrap();
        let all = reopened.identities().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], create_test_identity(1));
    }

    #[test]
    fn test_publish_key_updates_registered_user() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        storage.upsert_identity(&create_test_identity(5)).unwrap();

        let updated = storage.publish_key(5, "rotated").unwrap();
        assert_eq!(updated.public_key, "rotated");
        assert_eq!(storage.identities().unwrap()[0].public_key, "rotated");
    }

    #[test]
    fn test_publish_key_rejects_unknown_user() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        let err = storage.publish_key(42, "key").unwrap_err();
        assert_eq!(err, StorageError::UnknownUser { user_id: 42 });
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            /// Redb and memory backends agree on every read after the same
            /// append sequence.
            #[test]
            fn matches_memory_storage(
                senders in prop::collection::vec(1u64..8, 0..12),
                cursor in 0u64..16,
                limit in 0usize..16,
            ) {
                let dir = tempdir().unwrap();
                let redb = RedbStorage::open(dir.path().join("model.redb")).unwrap();
                let memory = MemoryStorage::new();

                for (offset, sender) in senders.iter().enumerate() {
                    let draft = create_test_draft(*sender, None);
                    let at = 1_000 + offset as u64;
                    prop_assert_eq!(
                        redb.append(&draft, at).unwrap(),
                        memory.append(&draft, at).unwrap()
                    );
                }

                prop_assert_eq!(redb.last_id().unwrap(), memory.last_id().unwrap());
                prop_assert_eq!(redb.envelope_count().unwrap(), memory.envelope_count().unwrap());
                prop_assert_eq!(redb.after(cursor).unwrap(), memory.after(cursor).unwrap());
                prop_assert_eq!(redb.newest(limit).unwrap(), memory.newest(limit).unwrap());
            }
        }
    }
}
