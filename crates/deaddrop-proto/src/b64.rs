//! Serde adapter encoding `Vec<u8>` fields as standard base64 text.
//!
//! Apply with `#[serde(with = "deaddrop_proto::b64")]`. Encoding is
//! unconditional (not gated on the format's human-readability) so a struct
//! serialized to CBOR and one serialized to JSON carry the same field shape.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

/// Serialize bytes as a standard base64 string.
pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&STANDARD.encode(bytes))
}

/// Deserialize bytes from a standard base64 string.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    STANDARD.decode(text.as_bytes()).map_err(D::Error::custom)
}
