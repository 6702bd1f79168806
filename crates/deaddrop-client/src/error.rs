//! Session-level error composition.

use thiserror::Error;

use deaddrop_core::{KeyringError, StoreError};
use deaddrop_crypto::CryptoError;

/// Errors from establishing, rotating, or ending a session.
///
/// Send execution has its own taxonomy ([`deaddrop_core::SendError`]);
/// this enum covers the key lifecycle edges around it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Private key load, generation, or persistence failed
    #[error(transparent)]
    Keyring(#[from] KeyringError),

    /// Key material could not be exported for publication
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The relay refused or failed an identity operation
    #[error(transparent)]
    Store(#[from] StoreError),
}
