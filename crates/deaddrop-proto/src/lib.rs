//! Data model for the deaddrop relay protocol.
//!
//! The relay stores and forwards [`Envelope`]s without ever holding key
//! material that could open them: message content is sealed with a one-time
//! symmetric key, and that key is wrapped separately for each recipient. The
//! only plaintext the relay sees is routing metadata (sender, recipient,
//! timestamps) and the public [`Identity`] directory.
//!
//! # Components
//!
//! - [`Envelope`]: A stored ciphertext copy addressed to one recipient
//! - [`EnvelopeDraft`]: Append input; the store assigns id and timestamp
//! - [`Audience`]: Whether a copy came from a direct send or a broadcast
//! - [`Identity`]: Directory entry binding a user to their public key
//!
//! Payloads use CBOR on the storage side and JSON-compatible serde shapes at
//! API boundaries; binary fields serialize as standard base64 text via
//! [`b64`] so the same struct round-trips through either format.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod b64;
mod envelope;
mod identity;

pub use envelope::{Audience, Envelope, EnvelopeDraft, EnvelopeId, UserId};
pub use identity::Identity;
