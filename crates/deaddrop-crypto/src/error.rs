//! Error types for hybrid envelope encryption.
//!
//! Variants separate fatal key-material problems (generation, import,
//! export) from the per-envelope failures callers are expected to absorb:
//! a `Decryption` error on one envelope means "not addressed to this key or
//! tampered with" and must never abort processing of its siblings.

use thiserror::Error;

/// Errors from key handling and envelope sealing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key pair generation failed
    #[error("key generation failed: {reason}")]
    KeyGeneration {
        /// What the underlying primitive reported
        reason: String,
    },

    /// A public or private key could not be decoded
    #[error("key import failed: {reason}")]
    KeyImport {
        /// Which decoding step rejected the material
        reason: String,
    },

    /// Key material could not be exported to its text encoding
    #[error("key export failed: {reason}")]
    KeyExport {
        /// What the underlying codec reported
        reason: String,
    },

    /// The content key could not be wrapped for a recipient
    #[error("key wrap failed: {reason}")]
    Wrap {
        /// What the RSA operation reported
        reason: String,
    },

    /// Sealing plaintext under the content key failed
    #[error("seal failed: {reason}")]
    Seal {
        /// What the AEAD reported
        reason: String,
    },

    /// Unwrap or AEAD verification failed; the envelope is unreadable
    /// under this key
    #[error("decryption failed: {reason}")]
    Decryption {
        /// Which stage rejected the envelope
        reason: String,
    },
}
