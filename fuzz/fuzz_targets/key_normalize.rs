//! Fuzz target for published key text handling
//!
//! Every directory entry is a string some other client published, so the
//! normalization and screening path sees adversarial input by default:
//! - PEM armor fragments, partial markers, mixed alphabets
//! - Interior whitespace and broken padding
//! - Placeholder markers hidden inside otherwise valid base64
//!
//! # Invariants
//!
//! - Normalization and screening NEVER panic
//! - Normalized text contains no whitespace and no url-safe characters
//! - Normalization is idempotent
//! - Import reaches the same verdict on raw and normalized text

#![no_main]

use deaddrop_crypto::{RecipientKey, is_usable_public_key, normalize_public_key};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|raw: &str| {
    let normalized = normalize_public_key(raw);

    assert!(!normalized.chars().any(char::is_whitespace));
    assert!(!normalized.contains('-'));
    assert!(!normalized.contains('_'));
    assert_eq!(normalize_public_key(&normalized), normalized);

    let _ = is_usable_public_key(raw);

    // The screening heuristic may disagree across forms (markers can be
    // split by whitespace that normalization removes), but import must not.
    let direct = RecipientKey::import(raw).is_ok();
    let canonical = RecipientKey::import(&normalized).is_ok();
    assert_eq!(direct, canonical);
});
