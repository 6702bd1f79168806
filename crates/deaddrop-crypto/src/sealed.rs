//! Hybrid sealing of message content.
//!
//! All functions are pure aside from the caller-provided RNG. Sealing draws
//! a fresh content key and nonce on every call; nothing here remembers
//! state between sends, so key reuse is impossible by construction.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use crate::{
    error::CryptoError,
    keys::{KeyPair, RecipientKey},
};

/// One-time AES-256 content key size in bytes.
pub const CONTENT_KEY_SIZE: usize = 32;

/// AES-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Message content sealed under a one-time key, ready for per-recipient
/// wrapping.
///
/// Holds the raw content key until every copy of the send has wrapped it;
/// the key is zeroized when this value drops. The ciphertext and nonce are
/// shared across copies, so fan-out appends clone them while calling
/// [`SealedContent::wrap_for`] once per recipient.
pub struct SealedContent {
    content_key: Zeroizing<[u8; CONTENT_KEY_SIZE]>,
    nonce: [u8; NONCE_SIZE],
    ciphertext: Vec<u8>,
}

impl SealedContent {
    /// Seal plaintext under a fresh content key and nonce.
    pub fn seal<R: CryptoRngCore>(plaintext: &[u8], rng: &mut R) -> Result<Self, CryptoError> {
        let mut content_key = Zeroizing::new([0u8; CONTENT_KEY_SIZE]);
        rng.fill_bytes(&mut content_key[..]);

        let mut nonce = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce);

        let cipher = Aes256Gcm::new_from_slice(&content_key[..])
            .map_err(|err| CryptoError::Seal { reason: err.to_string() })?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Seal { reason: "AEAD encryption failed".to_owned() })?;

        Ok(Self { content_key, nonce, ciphertext })
    }

    /// Wrap the content key for one recipient.
    ///
    /// Each call produces an independent wrapping; OAEP is randomized, so
    /// even two wraps for the same recipient differ byte-for-byte.
    pub fn wrap_for<R: CryptoRngCore>(
        &self,
        recipient: &RecipientKey,
        rng: &mut R,
    ) -> Result<Vec<u8>, CryptoError> {
        recipient.wrap(rng, &self.content_key[..])
    }

    /// AEAD ciphertext, authentication tag included.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Nonce the content was sealed under.
    pub fn nonce(&self) -> [u8; NONCE_SIZE] {
        self.nonce
    }
}

/// Seal plaintext and wrap the content key for a single recipient.
///
/// Composes [`SealedContent::seal`] and [`SealedContent::wrap_for`] for the
/// one-copy case; multi-copy sends seal once and wrap per recipient instead.
pub fn seal_for_recipient<R: CryptoRngCore>(
    plaintext: &[u8],
    recipient: &RecipientKey,
    rng: &mut R,
) -> Result<(SealedContent, Vec<u8>), CryptoError> {
    let sealed = SealedContent::seal(plaintext, rng)?;
    let wrapped_key = sealed.wrap_for(recipient, rng)?;
    Ok((sealed, wrapped_key))
}

/// Open one envelope copy: unwrap the content key, then decrypt.
///
/// Any failure along the way (wrong private key, corrupted wrapped key,
/// tampered ciphertext, malformed nonce) collapses to
/// [`CryptoError::Decryption`]. Callers treat that as "this copy is not
/// readable under this key" and move on.
pub fn open(
    ciphertext: &[u8],
    nonce: &[u8],
    wrapped_key: &[u8],
    keys: &KeyPair,
) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::Decryption {
            reason: format!("nonce must be {NONCE_SIZE} bytes, got {}", nonce.len()),
        });
    }

    let content_key = keys.unwrap_content_key(wrapped_key)?;
    if content_key.len() != CONTENT_KEY_SIZE {
        return Err(CryptoError::Decryption {
            reason: format!(
                "unwrapped key is {} bytes, expected {CONTENT_KEY_SIZE}",
                content_key.len()
            ),
        });
    }

    let cipher = Aes256Gcm::new_from_slice(&content_key)
        .map_err(|err| CryptoError::Decryption { reason: err.to_string() })?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decryption { reason: "AEAD authentication failed".to_owned() })
}
