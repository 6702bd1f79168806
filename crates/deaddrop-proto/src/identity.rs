//! Public identity directory entries.

use serde::{Deserialize, Serialize};

use crate::envelope::UserId;

/// Directory entry binding a user to their current public key.
///
/// The directory holds at most one active key per user. When a user
/// regenerates their key pair (for example after losing local key storage),
/// the new public key replaces the old one here and the raw string changes;
/// caches compare that raw string to detect staleness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The user this entry belongs to.
    pub user_id: UserId,

    /// Name shown alongside the user's messages.
    pub display_name: String,

    /// Exported public key: SPKI DER as base64 text, PEM armor tolerated.
    ///
    /// Kept verbatim as published. Consumers normalize before import and
    /// treat any change in this raw string as a key replacement.
    pub public_key: String,
}
