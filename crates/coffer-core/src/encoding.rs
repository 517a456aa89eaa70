//! Key encodings: lowercase hex text ⇄ raw bytes.
//!
//! Master keys, attribute keys, and key-pair halves all travel through the
//! same rule: text that is 64..=128 hex digits is decoded, anything else is
//! taken verbatim as bytes.

use crate::{CofferError, CofferResult};

/// Lowercase hex encoding of raw key bytes.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode hex text into raw bytes.
pub fn from_hex(text: &str) -> CofferResult<Vec<u8>> {
    hex::decode(text).map_err(|e| CofferError::config(format!("invalid hex key: {e}")))
}

/// Interpret configured key text, hex-decoding when it looks like a hex key.
pub fn decode_key(key: &[u8]) -> Vec<u8> {
    if is_hex_key(key) {
        if let Ok(decoded) = hex::decode(key) {
            return decoded;
        }
    }
    key.to_vec()
}

/// Decode a key and require an exact byte length.
pub fn decode_key_exact(key: &[u8], len: usize, name: &str) -> CofferResult<Vec<u8>> {
    let decoded = decode_key(key);
    if decoded.len() != len {
        return Err(CofferError::config(format!(
            "{name} must be {len} bytes ({} hex digits)",
            len * 2
        )));
    }
    Ok(decoded)
}

fn is_hex_key(key: &[u8]) -> bool {
    (64..=128).contains(&key.len()) && key.iter().all(u8::is_ascii_hexdigit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_key_is_decoded() {
        let text = "61".repeat(32);
        assert_eq!(decode_key(text.as_bytes()), vec![0x61u8; 32]);
    }

    #[test]
    fn test_uppercase_hex_is_decoded() {
        let text = "AB".repeat(32);
        assert_eq!(decode_key(text.as_bytes()), vec![0xABu8; 32]);
    }

    #[test]
    fn test_short_text_is_raw() {
        assert_eq!(decode_key(b"abcd"), b"abcd".to_vec());
    }

    #[test]
    fn test_odd_length_hex_is_raw() {
        let text = "a".repeat(65);
        assert_eq!(decode_key(text.as_bytes()).len(), 65);
    }

    #[test]
    fn test_exact_length_enforced() {
        let err = decode_key_exact(b"short", 32, "Key").unwrap_err();
        assert!(err.to_string().contains("Key must be 32 bytes (64 hex digits)"));
        let ok = decode_key_exact("00".repeat(32).as_bytes(), 32, "Key").unwrap();
        assert_eq!(ok, vec![0u8; 32]);
    }

    #[test]
    fn test_to_hex_lowercase() {
        assert_eq!(to_hex(&[0xAB, 0x01]), "ab01");
        assert_eq!(from_hex("ab01").unwrap(), vec![0xAB, 0x01]);
        assert!(from_hex("zz").is_err());
    }
}
