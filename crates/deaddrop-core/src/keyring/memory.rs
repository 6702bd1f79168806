use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use deaddrop_proto::UserId;
use zeroize::Zeroizing;

use super::KeyStore;
use crate::error::KeyringError;

/// In-memory key store for tests and simulation
///
/// Both slots are plain `HashMap`s behind an `Arc<Mutex<>>` so clones share
/// state. Uses `lock().expect()` which will panic if the mutex is poisoned,
/// acceptable for test code. The legacy slot can be seeded to exercise the
/// migration path.
#[derive(Clone)]
pub struct MemoryKeyStore {
    inner: Arc<Mutex<MemoryKeyStoreInner>>,
}

struct MemoryKeyStoreInner {
    /// Secure slot, the current key location
    secure: HashMap<UserId, String>,

    /// Legacy slot, the pre-keystore location migration drains
    legacy: HashMap<UserId, String>,
}

impl MemoryKeyStore {
    /// Create a new empty `MemoryKeyStore`
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryKeyStoreInner {
                secure: HashMap::new(),
                legacy: HashMap::new(),
            })),
        }
    }

    /// Store with the legacy slot pre-seeded for one user.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    pub fn with_legacy_key(user_id: UserId, material: &str) -> Self {
        let store = Self::new();
        store
            .inner
            .lock()
            .expect("Mutex poisoned")
            .legacy
            .insert(user_id, material.to_owned());
        store
    }

    /// Whether the secure slot holds material for the user.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    pub fn has_key(&self, user_id: UserId) -> bool {
        self.inner.lock().expect("Mutex poisoned").secure.contains_key(&user_id)
    }

    /// Whether the legacy slot holds material for the user.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    pub fn has_legacy_key(&self, user_id: UserId) -> bool {
        self.inner.lock().expect("Mutex poisoned").legacy.contains_key(&user_id)
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemoryKeyStore {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    fn save(&self, user_id: UserId, material: &str) -> Result<(), KeyringError> {
        self.inner
            .lock()
            .expect("Mutex poisoned")
            .secure
            .insert(user_id, material.to_owned());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    fn load(&self, user_id: UserId) -> Result<Option<Zeroizing<String>>, KeyringError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.secure.get(&user_id).cloned().map(Zeroizing::new))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    fn remove(&self, user_id: UserId) -> Result<(), KeyringError> {
        self.inner.lock().expect("Mutex poisoned").secure.remove(&user_id);
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    fn load_legacy(&self, user_id: UserId) -> Result<Option<Zeroizing<String>>, KeyringError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.legacy.get(&user_id).cloned().map(Zeroizing::new))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    fn remove_legacy(&self, user_id: UserId) -> Result<(), KeyringError> {
        self.inner.lock().expect("Mutex poisoned").legacy.remove(&user_id);
        Ok(())
    }
}
