//! Stored envelope records and the draft shape used to append them.

use serde::{Deserialize, Serialize};

/// Identifies a registered user across the directory and every envelope.
pub type UserId = u64;

/// Store-assigned envelope identifier.
///
/// Strictly increasing in append order, starting at 1. Sync cursors compare
/// against these ids; cursor value 0 means "nothing seen yet".
pub type EnvelopeId = u64;

/// Delivery intent recorded on every stored copy.
///
/// Broadcast is realized as one addressed envelope per recipient, so the
/// stored copies of a broadcast look structurally identical to direct copies
/// (real `recipient_id`, distinct `wrapped_key`). The audience marker is what
/// keeps a direct send's sender-side copy out of the broadcast timeline and
/// broadcast fan-out copies out of direct conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Audience {
    /// Copy produced by a two-party direct send (including the sender's own
    /// readable copy).
    Direct,
    /// Copy produced by a broadcast fan-out.
    Broadcast,
}

/// One encrypted message copy, addressed to a single recipient.
///
/// The relay can read every field here, but `ciphertext` only opens with the
/// one-time content key inside `wrapped_key`, and `wrapped_key` only opens
/// with the addressed recipient's private key. Copies produced by the same
/// send share `ciphertext` and `nonce` while differing in `wrapped_key` and
/// `recipient_id`.
///
/// Envelopes are immutable once stored and are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Store-assigned id, strictly increasing in append order.
    pub id: EnvelopeId,

    /// Author of the message.
    pub sender_id: UserId,

    /// Author's display name at send time, denormalized for rendering
    /// without a directory lookup.
    pub sender_display_name: String,

    /// The single recipient whose key wraps the content key.
    ///
    /// `None` appears only on records written before per-recipient
    /// addressing existed; readers treat those as broadcast copies.
    pub recipient_id: Option<UserId>,

    /// Whether this copy came from a direct send or a broadcast fan-out.
    pub audience: Audience,

    /// AEAD ciphertext of the message body, authentication tag included.
    #[serde(with = "crate::b64")]
    pub ciphertext: Vec<u8>,

    /// One-time content key, wrapped under the recipient's public key.
    #[serde(with = "crate::b64")]
    pub wrapped_key: Vec<u8>,

    /// AEAD nonce for `ciphertext`. Unique per sealed content, shared by
    /// all copies of the same send.
    #[serde(with = "crate::b64")]
    pub nonce: Vec<u8>,

    /// Store-assigned append timestamp, Unix milliseconds (UTC).
    pub created_at: u64,
}

/// Append input: an [`Envelope`] before the store assigns `id` and
/// `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeDraft {
    /// Author of the message.
    pub sender_id: UserId,

    /// Author's display name at send time.
    pub sender_display_name: String,

    /// The single recipient whose key wraps the content key.
    pub recipient_id: Option<UserId>,

    /// Whether this copy belongs to a direct send or a broadcast fan-out.
    pub audience: Audience,

    /// AEAD ciphertext of the message body, authentication tag included.
    #[serde(with = "crate::b64")]
    pub ciphertext: Vec<u8>,

    /// One-time content key, wrapped under the recipient's public key.
    #[serde(with = "crate::b64")]
    pub wrapped_key: Vec<u8>,

    /// AEAD nonce for `ciphertext`.
    #[serde(with = "crate::b64")]
    pub nonce: Vec<u8>,
}

impl EnvelopeDraft {
    /// Complete the draft with store-assigned fields.
    pub fn into_envelope(self, id: EnvelopeId, created_at: u64) -> Envelope {
        Envelope {
            id,
            sender_id: self.sender_id,
            sender_display_name: self.sender_display_name,
            recipient_id: self.recipient_id,
            audience: self.audience,
            ciphertext: self.ciphertext,
            wrapped_key: self.wrapped_key,
            nonce: self.nonce,
            created_at,
        }
    }
}
