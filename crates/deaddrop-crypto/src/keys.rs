//! RSA key pairs and imported recipient keys.
//!
//! Private keys live in PKCS#8 DER carried as base64 text inside the local
//! key store; public keys are published to the directory as SPKI DER in the
//! same text form. Neither encoding ever crosses the other boundary: the
//! exported public text is what peers import, the private text never leaves
//! the key store.

use core::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand_core::CryptoRngCore;
use rsa::{
    Oaep, RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    traits::PublicKeyParts as _,
};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{error::CryptoError, normalize::normalize_public_key};

/// Smallest accepted RSA modulus, in bits.
pub const MIN_KEY_BITS: usize = 2048;

/// An identity's RSA key pair.
///
/// Generation takes the RNG as a parameter so tests produce the same pair
/// from the same seed. The private half zeroizes on drop.
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh pair with the given modulus size.
    ///
    /// # Errors
    ///
    /// [`CryptoError::KeyGeneration`] when `bits` is below [`MIN_KEY_BITS`]
    /// or the prime search fails.
    pub fn generate<R: CryptoRngCore>(rng: &mut R, bits: usize) -> Result<Self, CryptoError> {
        if bits < MIN_KEY_BITS {
            return Err(CryptoError::KeyGeneration {
                reason: format!("{bits}-bit modulus is below the {MIN_KEY_BITS}-bit minimum"),
            });
        }

        let private = RsaPrivateKey::new(rng, bits)
            .map_err(|err| CryptoError::KeyGeneration { reason: err.to_string() })?;
        let public = RsaPublicKey::from(&private);

        Ok(Self { private, public })
    }

    /// Export the private half as base64 PKCS#8 DER for the key store.
    pub fn export_private_b64(&self) -> Result<Zeroizing<String>, CryptoError> {
        let der = self
            .private
            .to_pkcs8_der()
            .map_err(|err| CryptoError::KeyExport { reason: err.to_string() })?;

        Ok(Zeroizing::new(STANDARD.encode(der.as_bytes())))
    }

    /// Rebuild a pair from stored base64 PKCS#8 DER.
    pub fn import_private_b64(text: &str) -> Result<Self, CryptoError> {
        let der = Zeroizing::new(
            STANDARD
                .decode(text.trim().as_bytes())
                .map_err(|err| CryptoError::KeyImport { reason: format!("base64: {err}") })?,
        );

        let private = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|err| CryptoError::KeyImport { reason: format!("pkcs8: {err}") })?;
        let public = RsaPublicKey::from(&private);

        Ok(Self { private, public })
    }

    /// Export the public half as base64 SPKI DER for publication.
    pub fn export_public_b64(&self) -> Result<String, CryptoError> {
        let der = self
            .public
            .to_public_key_der()
            .map_err(|err| CryptoError::KeyExport { reason: err.to_string() })?;

        Ok(STANDARD.encode(der.as_bytes()))
    }

    /// View the public half as a wrapping target.
    ///
    /// Skips the export/import cycle when the sender wraps for themselves
    /// with local material instead of a directory entry.
    pub fn recipient_key(&self) -> RecipientKey {
        RecipientKey { key: self.public.clone() }
    }

    /// Unwrap a content key addressed to this pair.
    pub(crate) fn unwrap_content_key(
        &self,
        wrapped_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        self.private
            .decrypt(Oaep::new::<Sha256>(), wrapped_key)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::Decryption { reason: "content key unwrap failed".to_owned() })
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.public.size() * 8
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("modulus_bits", &self.bits()).finish_non_exhaustive()
    }
}

/// A peer's imported public key, ready to wrap content keys.
#[derive(Debug, Clone)]
pub struct RecipientKey {
    key: RsaPublicKey,
}

impl RecipientKey {
    /// Import published key text.
    ///
    /// Tolerates PEM armor, embedded whitespace, the url-safe base64
    /// alphabet, and missing padding; anything that still fails to decode
    /// as an RSA SPKI document is a [`CryptoError::KeyImport`].
    pub fn import(raw: &str) -> Result<Self, CryptoError> {
        let normalized = normalize_public_key(raw);

        let der = STANDARD
            .decode(normalized.as_bytes())
            .map_err(|err| CryptoError::KeyImport { reason: format!("base64: {err}") })?;

        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|err| CryptoError::KeyImport { reason: format!("spki: {err}") })?;

        Ok(Self { key })
    }

    /// Wrap a content key under this public key with OAEP-SHA-256.
    pub(crate) fn wrap<R: CryptoRngCore>(
        &self,
        rng: &mut R,
        content_key: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.key
            .encrypt(rng, Oaep::new::<Sha256>(), content_key)
            .map_err(|err| CryptoError::Wrap { reason: err.to_string() })
    }
}
