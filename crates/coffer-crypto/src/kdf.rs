//! Key derivation: master key → per-(table, attribute) key via HKDF-SHA384

use coffer_core::encoding::{decode_key, to_hex};
use coffer_core::{master_key, CofferError, CofferResult};
use hkdf::Hkdf;
use secrecy::ExposeSecret;
use sha2::Sha384;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// Prefix of the HKDF info string; the attribute name follows it.
const INFO_PREFIX: [u8; 32] = [0xB0; 32];

/// A 256-bit key bound to one table and attribute.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct AttributeKey {
    bytes: [u8; KEY_SIZE],
}

impl AttributeKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Lowercase hex, the form stored in configuration files.
    pub fn to_hex(&self) -> String {
        to_hex(&self.bytes)
    }
}

impl Drop for AttributeKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for AttributeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the key for `attribute` of `table` from a master key.
///
/// `master_key` may be raw bytes or 64..=128 hex digits. The table is the
/// HKDF salt and the attribute rides in the info string, so names cannot
/// bleed into each other.
pub fn derive_attribute_key(
    master_key: &[u8],
    table: &str,
    attribute: &str,
) -> CofferResult<AttributeKey> {
    if master_key.is_empty() {
        return Err(CofferError::config("missing master key"));
    }
    if table.is_empty() {
        return Err(CofferError::config("missing table for key generation"));
    }
    if attribute.is_empty() {
        return Err(CofferError::config("missing attribute for key generation"));
    }

    let mut ikm = decode_key(master_key);
    let hkdf = Hkdf::<Sha384>::new(Some(table.as_bytes()), &ikm);
    ikm.zeroize();

    let mut info = Vec::with_capacity(INFO_PREFIX.len() + attribute.len());
    info.extend_from_slice(&INFO_PREFIX);
    info.extend_from_slice(attribute.as_bytes());

    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(&info, &mut okm)
        .map_err(|e| CofferError::config(format!("HKDF expand failed: {e}")))?;
    Ok(AttributeKey::from_bytes(okm))
}

/// Derive an attribute key, falling back to the process master key.
pub fn attribute_key(
    table: &str,
    attribute: &str,
    master_key: Option<&[u8]>,
) -> CofferResult<AttributeKey> {
    match master_key {
        Some(key) => derive_attribute_key(key, table, attribute),
        None => {
            let key = master_key::master_key()
                .ok_or_else(|| CofferError::config("missing master key"))?;
            derive_attribute_key(key.expose_secret().as_bytes(), table, attribute)
        }
    }
}
