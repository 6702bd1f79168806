//! Error types for the deaddrop client core.
//!
//! Strongly-typed errors per layer: key persistence, send execution, and
//! the relay store boundary. Per-envelope decryption failures never appear
//! here; they are absorbed inside the synchronizer, because "not readable
//! under this key" is an expected state for fan-out siblings, not a fault.

use thiserror::Error;

use deaddrop_crypto::CryptoError;
use deaddrop_proto::UserId;

use crate::outbound::DeliveryReport;

/// Errors from key pair lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyringError {
    /// The key store failed to read or write
    ///
    /// A lost private key is unrecoverable, so callers surface this
    /// prominently instead of retry-swallowing it.
    #[error("key store failure: {reason}")]
    Storage {
        /// What the underlying store reported
        reason: String,
    },

    /// Key material itself failed to generate, import, or export
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Errors from the client-facing relay store boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store understood the operation and refused it
    #[error("store rejected {operation}: {reason}")]
    Rejected {
        /// Which operation was refused
        operation: &'static str,
        /// Why the store refused it
        reason: String,
    },

    /// The store is unreachable or failed internally
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// What the transport or backend reported
        reason: String,
    },
}

impl StoreError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Rejections are never transient; the same request will be refused
    /// again. Availability failures may clear up.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Errors from executing a direct or broadcast send.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// A send target's published key failed the usability check
    ///
    /// For a direct send this aborts the whole operation before any
    /// envelope is appended; broadcast sends skip the recipient instead.
    #[error("user {user_id} has no usable published key")]
    UnusableKey {
        /// Whose directory entry was unusable
        user_id: UserId,
    },

    /// The send target is not in the identity directory at all
    #[error("user {user_id} is not registered")]
    UnknownRecipient {
        /// The missing user
        user_id: UserId,
    },

    /// One copy of a direct send persisted while the other failed
    ///
    /// The persisted copy remains in the store; a retry produces fresh
    /// copies rather than completing the broken pair.
    #[error("direct send partially persisted: {reason}")]
    PartialAppend {
        /// What the failing append reported
        reason: String,
    },

    /// No broadcast copy could be appended
    #[error(
        "broadcast reached no recipients ({} skipped, {} failed)",
        .report.skipped.len(),
        .report.failed.len()
    )]
    Broadcast {
        /// Per-recipient outcome of the attempted fan-out
        report: DeliveryReport,
    },

    /// Key material failed while planning the send
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The relay store failed before any copy was appended
    #[error(transparent)]
    Store(#[from] StoreError),
}
