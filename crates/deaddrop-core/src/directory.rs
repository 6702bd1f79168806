//! Cache of imported recipient keys.
//!
//! Every send needs the recipient's published key as a parsed
//! [`RecipientKey`], but the roster hands out raw base64 text. Importing
//! is normalize + decode + DER parse, cheap enough per call yet wasteful
//! per message, so the directory keeps the parsed form keyed by user and
//! re-imports only when the published text changes.
//!
//! Staleness is detected by comparing the raw strings. A user who rotates
//! their key republishes a different string; byte-equal text always parses
//! to the same key, so no fingerprinting is needed.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use deaddrop_crypto::{CryptoError, RecipientKey};
use deaddrop_proto::UserId;

struct CacheEntry {
    raw: String,
    key: Arc<RecipientKey>,
}

/// Shared, interior-mutable cache mapping users to their imported keys.
#[derive(Default)]
pub struct PublicKeyDirectory {
    cache: Mutex<HashMap<UserId, CacheEntry>>,
}

impl PublicKeyDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Imported key for `user_id` whose published text is `raw`.
    ///
    /// Returns the cached key when `raw` matches the text it was imported
    /// from; otherwise imports `raw` and caches the result. Import runs
    /// outside the lock, so two threads racing on the same fresh key both
    /// import and the last insert wins, which is harmless because import
    /// is deterministic.
    ///
    /// On import failure any cached entry for the user is dropped. The
    /// published text has moved on, so the old parsed key no longer
    /// represents what the roster says.
    pub fn resolve(&self, user_id: UserId, raw: &str) -> Result<Arc<RecipientKey>, CryptoError> {
        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = cache.get(&user_id) {
                if entry.raw == raw {
                    return Ok(Arc::clone(&entry.key));
                }
                tracing::debug!(user_id, "published key changed, reimporting");
            }
        }

        match RecipientKey::import(raw) {
            Ok(key) => {
                let key = Arc::new(key);
                let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
                cache.insert(user_id, CacheEntry { raw: raw.to_owned(), key: Arc::clone(&key) });
                Ok(key)
            }
            Err(err) => {
                let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
                if cache.remove(&user_id).is_some() {
                    tracing::debug!(user_id, "cached key evicted after import failure");
                }
                Err(err)
            }
        }
    }

    /// Drop the cached key for `user_id`, if any.
    pub fn evict(&self, user_id: UserId) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.remove(&user_id);
    }
}
