//! Private key lifecycle: generation, persistence, and legacy migration.
//!
//! The key pair is the account. Every envelope ever addressed to a user is
//! wrapped under their public key, so losing the private half silently
//! orphans the full history. The manager therefore treats persistence
//! failures as loud errors and never deletes a key before its replacement
//! location is durable.
//!
//! Storage goes through the [`KeyStore`] trait with two slots per user:
//! the secure slot (current) and the legacy slot (where an earlier release
//! kept keys in plaintext app data). [`KeyManager::load`] performs the
//! one-time migration: secure copy written first, legacy copy removed
//! second, so a crash between the two steps leaves the key readable from
//! at least one location.

mod file;
mod memory;

pub use file::FileKeyStore;
pub use memory::MemoryKeyStore;

use deaddrop_crypto::KeyPair;
use deaddrop_proto::UserId;
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use crate::error::KeyringError;

/// Persistence backend for private key material.
///
/// Synchronous, like the relay's storage trait; key operations happen at
/// session edges, never on the message path. Implementations share state
/// via internal `Arc`, so clones address the same slots. Loaded material
/// comes back in [`Zeroizing`] wrappers so dropped copies are wiped.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned. Acceptable for test stores; production stores should degrade
/// to an error instead.
pub trait KeyStore: Clone + Send + Sync + 'static {
    /// Write `material` to the user's secure slot, replacing any previous
    /// value.
    fn save(&self, user_id: UserId, material: &str) -> Result<(), KeyringError>;

    /// Read the user's secure slot. `None` if it was never written.
    fn load(&self, user_id: UserId) -> Result<Option<Zeroizing<String>>, KeyringError>;

    /// Delete the user's secure slot. Removing an absent slot is not an
    /// error.
    fn remove(&self, user_id: UserId) -> Result<(), KeyringError>;

    /// Read the user's legacy slot, the location a pre-keystore release
    /// wrote to.
    fn load_legacy(&self, user_id: UserId) -> Result<Option<Zeroizing<String>>, KeyringError>;

    /// Delete the user's legacy slot. Removing an absent slot is not an
    /// error.
    fn remove_legacy(&self, user_id: UserId) -> Result<(), KeyringError>;
}

/// Tuning for key generation and session-end behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConfig {
    /// RSA modulus size for newly generated pairs.
    pub bits: usize,
    /// Wipe the stored key when the session ends.
    ///
    /// Off by default: a wiped key orphans all previously received
    /// ciphertext, so the wipe is reserved for deliberate user action.
    pub clear_on_logout: bool,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self { bits: 2048, clear_on_logout: false }
    }
}

/// Where a loaded key pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    /// Read from the secure slot.
    Loaded,
    /// Recovered from the legacy slot and re-persisted securely.
    Migrated,
    /// Freshly generated; the public half must be (re)published.
    Generated,
}

/// Key pair lifecycle built on a [`KeyStore`].
#[derive(Debug, Clone)]
pub struct KeyManager<K> {
    store: K,
    config: KeyConfig,
}

impl<K: KeyStore> KeyManager<K> {
    /// Manager with default configuration.
    pub fn new(store: K) -> Self {
        Self::with_config(store, KeyConfig::default())
    }

    /// Manager with explicit configuration.
    pub fn with_config(store: K, config: KeyConfig) -> Self {
        Self { store, config }
    }

    /// Generate a fresh pair at the configured strength.
    pub fn generate<R: CryptoRngCore>(&self, rng: &mut R) -> Result<KeyPair, KeyringError> {
        Ok(KeyPair::generate(rng, self.config.bits)?)
    }

    /// Write the pair to the user's secure slot.
    pub fn persist(&self, user_id: UserId, keys: &KeyPair) -> Result<(), KeyringError> {
        let material = keys.export_private_b64()?;
        if let Err(err) = self.store.save(user_id, &material) {
            tracing::error!(user_id, %err, "private key persistence failed");
            return Err(err);
        }
        Ok(())
    }

    /// Load the user's pair, migrating from the legacy slot if needed.
    ///
    /// Returns `None` when no slot holds material. Corrupt material is an
    /// error, not `None`: regenerating over a key that might still be
    /// recoverable elsewhere would orphan the account's history.
    pub fn load(&self, user_id: UserId) -> Result<Option<(KeyPair, KeyOrigin)>, KeyringError> {
        if let Some(material) = self.store.load(user_id)? {
            let keys = KeyPair::import_private_b64(&material)?;
            return Ok(Some((keys, KeyOrigin::Loaded)));
        }

        let Some(material) = self.store.load_legacy(user_id)? else {
            return Ok(None);
        };
        let keys = KeyPair::import_private_b64(&material)?;

        // Secure copy first; a crash here leaves the key in both slots
        self.persist(user_id, &keys)?;
        if let Err(err) = self.store.remove_legacy(user_id) {
            // The key is already safe; a lingering legacy copy is cleanup
            // debt, not data loss
            tracing::warn!(user_id, %err, "legacy key slot removal failed");
        } else {
            tracing::info!(user_id, "migrated private key to secure storage");
        }

        Ok(Some((keys, KeyOrigin::Migrated)))
    }

    /// Load the user's pair, generating and persisting one when no slot
    /// holds material.
    pub fn load_or_generate<R: CryptoRngCore>(
        &self,
        user_id: UserId,
        rng: &mut R,
    ) -> Result<(KeyPair, KeyOrigin), KeyringError> {
        if let Some(found) = self.load(user_id)? {
            return Ok(found);
        }

        let keys = self.generate(rng)?;
        self.persist(user_id, &keys)?;
        tracing::info!(user_id, bits = self.config.bits, "generated new key pair");
        Ok((keys, KeyOrigin::Generated))
    }

    /// Wipe both slots for the user.
    pub fn clear(&self, user_id: UserId) -> Result<(), KeyringError> {
        self.store.remove(user_id)?;
        self.store.remove_legacy(user_id)?;
        tracing::info!(user_id, "key material cleared");
        Ok(())
    }

    /// Session teardown: wipes the key only when
    /// [`KeyConfig::clear_on_logout`] is set.
    pub fn end_session(&self, user_id: UserId) -> Result<(), KeyringError> {
        if self.config.clear_on_logout {
            return self.clear(user_id);
        }
        tracing::debug!(user_id, "session ended, key material retained");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    const USER: UserId = 7;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(42)
    }

    fn seeded_pair() -> KeyPair {
        KeyPair::generate(&mut rng(), 2048).unwrap()
    }

    #[test]
    fn load_on_empty_store_finds_nothing() {
        let manager = KeyManager::new(MemoryKeyStore::new());
        assert!(manager.load(USER).unwrap().is_none());
    }

    #[test]
    fn persist_then_load_round_trips() {
        let manager = KeyManager::new(MemoryKeyStore::new());
        let keys = seeded_pair();

        manager.persist(USER, &keys).unwrap();
        let (loaded, origin) = manager.load(USER).unwrap().unwrap();

        assert_eq!(origin, KeyOrigin::Loaded);
        assert_eq!(
            loaded.export_public_b64().unwrap(),
            keys.export_public_b64().unwrap()
        );
    }

    #[test]
    fn load_or_generate_persists_the_new_pair() {
        let store = MemoryKeyStore::new();
        let manager = KeyManager::new(store.clone());

        let (generated, origin) = manager.load_or_generate(USER, &mut rng()).unwrap();
        assert_eq!(origin, KeyOrigin::Generated);
        assert!(store.has_key(USER));

        // Second call loads the same pair instead of regenerating
        let (loaded, origin) = manager.load_or_generate(USER, &mut rng()).unwrap();
        assert_eq!(origin, KeyOrigin::Loaded);
        assert_eq!(
            loaded.export_public_b64().unwrap(),
            generated.export_public_b64().unwrap()
        );
    }

    #[test]
    fn legacy_key_migrates_to_secure_slot() {
        let keys = seeded_pair();
        let store = MemoryKeyStore::with_legacy_key(USER, &keys.export_private_b64().unwrap());
        let manager = KeyManager::new(store.clone());

        let (loaded, origin) = manager.load(USER).unwrap().unwrap();

        assert_eq!(origin, KeyOrigin::Migrated);
        assert_eq!(
            loaded.export_public_b64().unwrap(),
            keys.export_public_b64().unwrap()
        );
        assert!(store.has_key(USER));
        assert!(!store.has_legacy_key(USER));
    }

    #[test]
    fn migration_happens_once() {
        let keys = seeded_pair();
        let store = MemoryKeyStore::with_legacy_key(USER, &keys.export_private_b64().unwrap());
        let manager = KeyManager::new(store);

        let (_, first) = manager.load(USER).unwrap().unwrap();
        let (_, second) = manager.load(USER).unwrap().unwrap();

        assert_eq!(first, KeyOrigin::Migrated);
        assert_eq!(second, KeyOrigin::Loaded);
    }

    #[test]
    fn secure_slot_wins_over_legacy() {
        let secure = seeded_pair();
        let legacy = KeyPair::generate(&mut ChaCha20Rng::seed_from_u64(43), 2048).unwrap();

        let store = MemoryKeyStore::with_legacy_key(USER, &legacy.export_private_b64().unwrap());
        let manager = KeyManager::new(store.clone());
        manager.persist(USER, &secure).unwrap();

        let (loaded, origin) = manager.load(USER).unwrap().unwrap();

        assert_eq!(origin, KeyOrigin::Loaded);
        assert_eq!(
            loaded.export_public_b64().unwrap(),
            secure.export_public_b64().unwrap()
        );
        // The untouched legacy copy is left for a later load to clean up
        assert!(store.has_legacy_key(USER));
    }

    #[test]
    fn corrupt_secure_material_is_an_error_not_regeneration() {
        let store = MemoryKeyStore::new();
        store.save(USER, "definitely not pkcs8").unwrap();
        let manager = KeyManager::new(store);

        assert!(matches!(manager.load(USER), Err(KeyringError::Crypto(_))));
    }

    #[test]
    fn clear_wipes_both_slots() {
        let keys = seeded_pair();
        let store = MemoryKeyStore::with_legacy_key(USER, &keys.export_private_b64().unwrap());
        let manager = KeyManager::new(store.clone());
        manager.persist(USER, &keys).unwrap();

        manager.clear(USER).unwrap();

        assert!(!store.has_key(USER));
        assert!(!store.has_legacy_key(USER));
        assert!(manager.load(USER).unwrap().is_none());
    }

    #[test]
    fn end_session_retains_by_default() {
        let store = MemoryKeyStore::new();
        let manager = KeyManager::new(store.clone());
        manager.persist(USER, &seeded_pair()).unwrap();

        manager.end_session(USER).unwrap();

        assert!(store.has_key(USER));
    }

    #[test]
    fn end_session_wipes_when_configured() {
        let store = MemoryKeyStore::new();
        let config = KeyConfig { clear_on_logout: true, ..KeyConfig::default() };
        let manager = KeyManager::with_config(store.clone(), config);
        manager.persist(USER, &seeded_pair()).unwrap();

        manager.end_session(USER).unwrap();

        assert!(!store.has_key(USER));
    }

    #[test]
    fn generate_rejects_weak_moduli() {
        let manager = KeyManager::with_config(
            MemoryKeyStore::new(),
            KeyConfig { bits: 1024, ..KeyConfig::default() },
        );

        assert!(manager.generate(&mut rng()).is_err());
    }

    #[test]
    fn users_have_independent_slots() {
        let manager = KeyManager::new(MemoryKeyStore::new());
        let keys = seeded_pair();

        manager.persist(1, &keys).unwrap();

        assert!(manager.load(1).unwrap().is_some());
        assert!(manager.load(2).unwrap().is_none());
    }
}
