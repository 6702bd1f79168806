//! Fuzz target for opening envelope copies under hostile stored bytes
//!
//! Everything `open` consumes (ciphertext, nonce, wrapped key) arrives from
//! the relay, which a reader must assume can serve anything:
//! - Completely arbitrary bytes in all three fields
//! - A genuine copy with bits flipped in exactly one field
//!
//! # Invariants
//!
//! - Opening NEVER panics, whatever the stored bytes
//! - Tampering with any field of a genuine copy fails authentication
//! - No partial plaintext escapes a failed open (it returns Err, not data)

#![no_main]

use std::sync::OnceLock;

use arbitrary::Arbitrary;
use deaddrop_crypto::{KeyPair, NONCE_SIZE, open, seal_for_recipient};
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

const PLAINTEXT: &[u8] = b"tamper evident fixture body";

#[derive(Debug, Arbitrary)]
enum StoredCopy {
    Garbage { ciphertext: Vec<u8>, nonce: Vec<u8>, wrapped_key: Vec<u8> },
    FlippedCiphertext { offset: u16, mask: u8 },
    FlippedWrappedKey { offset: u16, mask: u8 },
    FlippedNonce { offset: u8, mask: u8 },
}

struct Genuine {
    ciphertext: Vec<u8>,
    nonce: [u8; NONCE_SIZE],
    wrapped_key: Vec<u8>,
}

fn keys() -> &'static KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(|| {
        KeyPair::generate(&mut ChaCha20Rng::seed_from_u64(0x5EA1), 2048).expect("keygen failed")
    })
}

fn genuine() -> &'static Genuine {
    static GENUINE: OnceLock<Genuine> = OnceLock::new();
    GENUINE.get_or_init(|| {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let (sealed, wrapped_key) =
            seal_for_recipient(PLAINTEXT, &keys().recipient_key(), &mut rng)
                .expect("seal failed");

        let copy = Genuine {
            ciphertext: sealed.ciphertext().to_vec(),
            nonce: sealed.nonce(),
            wrapped_key,
        };

        // The fixture must open before tampering, or every assertion below
        // would pass vacuously.
        let recovered = open(&copy.ciphertext, &copy.nonce, &copy.wrapped_key, keys())
            .expect("genuine copy must open");
        assert_eq!(recovered, PLAINTEXT);

        copy
    })
}

/// Flip at least one bit at `offset` (mask 0 would be a no-op).
fn flip(bytes: &mut [u8], offset: usize, mask: u8) {
    let index = offset % bytes.len();
    bytes[index] ^= mask | 1;
}

fuzz_target!(|copy: StoredCopy| {
    let fixture = genuine();

    match copy {
        StoredCopy::Garbage { ciphertext, nonce, wrapped_key } => {
            assert!(open(&ciphertext, &nonce, &wrapped_key, keys()).is_err());
        }

        StoredCopy::FlippedCiphertext { offset, mask } => {
            let mut ciphertext = fixture.ciphertext.clone();
            flip(&mut ciphertext, offset as usize, mask);

            assert!(open(&ciphertext, &fixture.nonce, &fixture.wrapped_key, keys()).is_err());
        }

        StoredCopy::FlippedWrappedKey { offset, mask } => {
            let mut wrapped_key = fixture.wrapped_key.clone();
            flip(&mut wrapped_key, offset as usize, mask);

            assert!(open(&fixture.ciphertext, &fixture.nonce, &wrapped_key, keys()).is_err());
        }

        StoredCopy::FlippedNonce { offset, mask } => {
            let mut nonce = fixture.nonce;
            flip(&mut nonce, offset as usize, mask);

            assert!(open(&fixture.ciphertext, &nonce, &fixture.wrapped_key, keys()).is_err());
        }
    }
});
