//! Fuzz target for stored-record CBOR decoding
//!
//! Storage backends persist envelopes and directory entries as CBOR and
//! trust the decoder to reject whatever ends up corrupted on disk:
//! - Truncated or bit-flipped records
//! - Huge claimed lengths for the binary fields
//! - Wrong types where the audience enum or base64 text is expected
//! - Completely arbitrary bytes
//!
//! # Invariants
//!
//! - Decoding NEVER panics, only returns Err
//! - Any record that decodes survives a re-encode and decodes back equal

#![no_main]

use deaddrop_proto::{Envelope, Identity};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = ciborium::de::from_reader::<Envelope, _>(data) {
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&envelope, &mut encoded).expect("re-encode failed");

        let decoded: Envelope = ciborium::de::from_reader(encoded.as_slice())
            .expect("re-encoded envelope failed to decode");
        assert_eq!(envelope, decoded);
    }

    if let Ok(identity) = ciborium::de::from_reader::<Identity, _>(data) {
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&identity, &mut encoded).expect("re-encode failed");

        let decoded: Identity = ciborium::de::from_reader(encoded.as_slice())
            .expect("re-encoded identity failed to decode");
        assert_eq!(identity, decoded);
    }
});
