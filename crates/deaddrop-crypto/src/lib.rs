//! Deaddrop Cryptographic Primitives
//!
//! Hybrid envelope encryption for the deaddrop relay. Pure functions with
//! deterministic outputs; callers provide the RNG, which keeps every
//! operation reproducible under a seeded generator in tests.
//!
//! # Sealing Model
//!
//! Each send seals the message body once and wraps the content key
//! separately for every copy:
//!
//! ```text
//! Plaintext
//!     │
//!     ▼
//! AES-256-GCM (fresh one-time key + 96-bit nonce) → Ciphertext
//!     │
//!     ▼  per recipient
//! RSA-OAEP-SHA-256 wrap of the content key → wrapped key
//! ```
//!
//! The ciphertext and nonce are shared by all copies of a send; the wrapped
//! key is what differs per copy. A relay holding every envelope ever stored
//! can decrypt none of them.
//!
//! # Security
//!
//! Relay Blindness:
//! - Content keys exist in plaintext only inside sealing and opening calls
//! - Wrapped keys open exclusively under the addressed recipient's private key
//! - OAEP padding keeps wrapping CCA-resistant
//!
//! Copy Isolation:
//! - Compromising one recipient's private key exposes only copies wrapped
//!   for that recipient
//! - Content keys are never reused across sends
//!
//! Tamper Evidence:
//! - GCM authentication rejects any modified ciphertext
//! - A flipped bit in the wrapped key fails OAEP decoding
//! - Failed authentication -> reject, never partial plaintext

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod keys;
mod normalize;
mod sealed;

pub use error::CryptoError;
pub use keys::{KeyPair, MIN_KEY_BITS, RecipientKey};
pub use normalize::{MIN_PUBLIC_KEY_DER_LEN, is_usable_public_key, normalize_public_key};
pub use sealed::{CONTENT_KEY_SIZE, NONCE_SIZE, SealedContent, open, seal_for_recipient};
