//! Published key text normalization and usability checks.
//!
//! Directory entries arrive in whatever form the publishing client exported:
//! bare base64, PEM-armored, line-wrapped, sometimes with the url-safe
//! alphabet or missing padding. Normalization maps all of those onto one
//! canonical standard-base64 string so import and caching behave
//! identically regardless of the published form.

use base64::{Engine as _, engine::general_purpose::STANDARD};

/// Smallest DER length accepted as a plausible SPKI public key.
///
/// A real RSA-2048 SPKI is 294 bytes; this threshold only has to reject
/// obviously truncated material, not measure key strength.
pub const MIN_PUBLIC_KEY_DER_LEN: usize = 128;

const PEM_BEGIN: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_END: &str = "-----END PUBLIC KEY-----";

/// Reduce published key text to canonical standard base64.
///
/// Strips PEM armor and all whitespace, maps the url-safe alphabet onto the
/// standard one, and repairs missing `=` padding. The output is not
/// guaranteed to decode; it is guaranteed to be the same string for every
/// published form of the same key.
pub fn normalize_public_key(raw: &str) -> String {
    let stripped = raw.replace(PEM_BEGIN, "").replace(PEM_END, "");

    let mut normalized: String = stripped
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    match normalized.len() % 4 {
        2 => normalized.push_str("=="),
        3 => normalized.push('='),
        _ => {}
    }

    normalized
}

/// Cheap pre-flight: is this published key worth an import attempt?
///
/// Used to skip a recipient during broadcast fan-out and to abort a direct
/// send before spending RSA cycles. Rejects empty and placeholder entries,
/// text that is not base64, and decoded material too short to be an SPKI
/// document or not starting with an ASN.1 SEQUENCE.
pub fn is_usable_public_key(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.contains("placeholder") || lower.contains("pending") {
        return false;
    }

    let normalized = normalize_public_key(raw);
    let Ok(der) = STANDARD.decode(normalized.as_bytes()) else {
        return false;
    };

    der.len() >= MIN_PUBLIC_KEY_DER_LEN && der.first() == Some(&0x30)
}
