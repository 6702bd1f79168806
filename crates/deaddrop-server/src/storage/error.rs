//! Storage error types

use deaddrop_proto::UserId;
use thiserror::Error;

/// Errors from storage operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend I/O failure (database open, read, write, commit).
    #[error("storage io error: {0}")]
    Io(String),

    /// A stored record could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// A key update referenced a user with no registered identity.
    #[error("no identity registered for user {user_id}")]
    UnknownUser {
        /// The unregistered user id.
        user_id: UserId,
    },

    /// The envelope id sequence reached `u64::MAX`.
    ///
    /// Further appends are refused rather than wrapping the id space.
    #[error("envelope id space exhausted")]
    IdOverflow,
}
