//! The view of a host record that box resolution needs.

use coffer_core::{CofferError, CofferResult};
use coffer_crypto::cipher_box::KeyBytes;
use coffer_crypto::padding::DEFAULT_BLOCK_SIZE;
use coffer_crypto::Algorithm;
use zeroize::Zeroizing;

/// A value returned by a named accessor on a record.
#[derive(Clone, PartialEq, Eq)]
pub enum LookupValue {
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl std::fmt::Debug for LookupValue {
    // Accessors may return key material; only the shape is printed.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupValue::Null => f.write_str("Null"),
            LookupValue::Bool(b) => write!(f, "Bool({b})"),
            LookupValue::Integer(i) => write!(f, "Integer({i})"),
            LookupValue::Text(s) => write!(f, "Text(<{} bytes>)", s.len()),
            LookupValue::Bytes(b) => write!(f, "Bytes(<{} bytes>)", b.len()),
        }
    }
}

/// A record being encrypted, decrypted, or migrated.
pub trait RecordContext {
    /// Stable identifier of the record's class; the registry key.
    fn model_name(&self) -> &str;

    /// Table or collection name fed to key derivation.
    fn table_name(&self) -> &str;

    /// Invoke the named accessor. `None` means the record has no such accessor.
    fn lookup(&self, name: &str) -> Option<LookupValue>;
}

/// Conversion from an accessor result into a typed option value.
pub trait FromLookup: Sized {
    fn from_lookup(value: LookupValue) -> CofferResult<Self>;
}

impl FromLookup for KeyBytes {
    fn from_lookup(value: LookupValue) -> CofferResult<Self> {
        match value {
            LookupValue::Text(s) => Ok(Zeroizing::new(s.into_bytes())),
            LookupValue::Bytes(b) => Ok(Zeroizing::new(b)),
            other => Err(type_error("key", &other)),
        }
    }
}

impl FromLookup for Algorithm {
    fn from_lookup(value: LookupValue) -> CofferResult<Self> {
        match value {
            LookupValue::Text(s) => s.parse(),
            other => Err(type_error("algorithm", &other)),
        }
    }
}

/// Padding block size; `true` selects the default block, `false` or `0` disables.
impl FromLookup for usize {
    fn from_lookup(value: LookupValue) -> CofferResult<Self> {
        match value {
            LookupValue::Bool(true) => Ok(DEFAULT_BLOCK_SIZE),
            LookupValue::Bool(false) => Ok(0),
            LookupValue::Integer(i) => usize::try_from(i)
                .map_err(|_| CofferError::config(format!("padding must be non-negative, got {i}"))),
            other => Err(type_error("padding", &other)),
        }
    }
}

impl FromLookup for String {
    fn from_lookup(value: LookupValue) -> CofferResult<Self> {
        match value {
            LookupValue::Text(s) => Ok(s),
            other => Err(type_error("name", &other)),
        }
    }
}

fn type_error(what: &str, value: &LookupValue) -> CofferError {
    CofferError::config(format!("expected {what}, accessor returned {value:?}"))
}
