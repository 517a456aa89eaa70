//! Declarative per-attribute encryption configuration.

use coffer_core::{CofferError, CofferResult};
use coffer_crypto::cipher_box::KeyBytes;
use coffer_crypto::Algorithm;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::context::{FromLookup, LookupValue, RecordContext};

/// A computation evaluated against the record being processed.
pub type Deferred<T> = Arc<dyn Fn(&dyn RecordContext) -> CofferResult<T> + Send + Sync>;

/// One configuration value: fixed, computed per record, or read from a named accessor.
pub enum ConfigValue<T> {
    Literal(T),
    Deferred(Deferred<T>),
    Named(String),
}

impl<T> ConfigValue<T> {
    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn(&dyn RecordContext) -> CofferResult<T> + Send + Sync + 'static,
    {
        ConfigValue::Deferred(Arc::new(f))
    }

    pub fn named(name: impl Into<String>) -> Self {
        ConfigValue::Named(name.into())
    }

    /// Whether resolving this value reads the record.
    pub fn reads_record(&self) -> bool {
        !matches!(self, ConfigValue::Literal(_))
    }
}

impl<T: FromLookup + Clone> ConfigValue<T> {
    /// Evaluate against `ctx`. A named accessor returning null yields `None`.
    pub fn resolve(&self, ctx: &dyn RecordContext) -> CofferResult<Option<T>> {
        match self {
            ConfigValue::Literal(value) => Ok(Some(value.clone())),
            ConfigValue::Deferred(f) => f(ctx).map(Some),
            ConfigValue::Named(name) => match ctx.lookup(name) {
                None => Err(CofferError::config(format!(
                    "{} has no accessor named {name}",
                    ctx.model_name()
                ))),
                Some(LookupValue::Null) => Ok(None),
                Some(value) => T::from_lookup(value).map(Some),
            },
        }
    }
}

impl<T: Clone> Clone for ConfigValue<T> {
    fn clone(&self) -> Self {
        match self {
            ConfigValue::Literal(v) => ConfigValue::Literal(v.clone()),
            ConfigValue::Deferred(f) => ConfigValue::Deferred(Arc::clone(f)),
            ConfigValue::Named(n) => ConfigValue::Named(n.clone()),
        }
    }
}

impl<T> std::fmt::Debug for ConfigValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::Literal(_) => f.write_str("Literal(..)"),
            ConfigValue::Deferred(_) => f.write_str("Deferred(..)"),
            ConfigValue::Named(n) => f.debug_tuple("Named").field(n).finish(),
        }
    }
}

impl From<&str> for ConfigValue<KeyBytes> {
    fn from(key: &str) -> Self {
        ConfigValue::Literal(Zeroizing::new(key.as_bytes().to_vec()))
    }
}

impl From<Algorithm> for ConfigValue<Algorithm> {
    fn from(algorithm: Algorithm) -> Self {
        ConfigValue::Literal(algorithm)
    }
}

/// Host-framework bookkeeping stored next to the encryption options.
///
/// None of it affects which box gets built.
#[derive(Debug, Clone, Default)]
pub struct AttributeMeta {
    /// Column holding the ciphertext (e.g. `email_ciphertext`)
    pub encrypted_attribute: Option<String>,
    /// Plaintext column still populated; the migrator backfills ciphertext from it
    pub migrating: bool,
    /// Attribute is a file attachment rather than a column
    pub attached: bool,
    /// Host type name used to cast decrypted values
    pub value_type: Option<String>,
    /// Ciphertext stored as base64 text rather than binary
    pub encode: bool,
}

/// How to obtain the box for one attribute.
///
/// With no `key`, `encryption_key`, or `decryption_key`, the key is derived
/// from the master key (the per-config override, else the process default).
#[derive(Debug, Clone, Default)]
pub struct BoxConfig {
    pub key: Option<ConfigValue<KeyBytes>>,
    pub encryption_key: Option<ConfigValue<KeyBytes>>,
    pub decryption_key: Option<ConfigValue<KeyBytes>>,
    pub master_key: Option<ConfigValue<KeyBytes>>,
    pub algorithm: Option<ConfigValue<Algorithm>>,
    pub padding: Option<ConfigValue<usize>>,
    /// Table name fed to derivation instead of the record's table
    pub key_table: Option<ConfigValue<String>>,
    /// Attribute name fed to derivation instead of the configured attribute
    pub key_attribute: Option<ConfigValue<String>>,
    pub previous_versions: Vec<BoxConfig>,
    pub meta: AttributeMeta,
}

impl BoxConfig {
    /// Derive the key from the process master key.
    pub fn derived() -> Self {
        Self::default()
    }

    /// Whether any value here or in a previous version is computed per record.
    pub fn reads_record(&self) -> bool {
        fn reads<T>(v: &Option<ConfigValue<T>>) -> bool {
            v.as_ref().is_some_and(ConfigValue::reads_record)
        }
        reads(&self.key)
            || reads(&self.encryption_key)
            || reads(&self.decryption_key)
            || reads(&self.master_key)
            || reads(&self.algorithm)
            || reads(&self.padding)
            || reads(&self.key_table)
            || reads(&self.key_attribute)
            || self.previous_versions.iter().any(BoxConfig::reads_record)
    }

    /// No key field is configured, so every record derives its key.
    pub fn always_derives(&self) -> bool {
        self.key.is_none() && self.encryption_key.is_none() && self.decryption_key.is_none()
    }

    pub fn with_key(mut self, key: impl Into<ConfigValue<KeyBytes>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_encryption_key(mut self, key: impl Into<ConfigValue<KeyBytes>>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    pub fn with_decryption_key(mut self, key: impl Into<ConfigValue<KeyBytes>>) -> Self {
        self.decryption_key = Some(key.into());
        self
    }

    pub fn with_master_key(mut self, key: impl Into<ConfigValue<KeyBytes>>) -> Self {
        self.master_key = Some(key.into());
        self
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<ConfigValue<Algorithm>>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    pub fn with_padding(mut self, block_size: ConfigValue<usize>) -> Self {
        self.padding = Some(block_size);
        self
    }

    pub fn with_key_table(mut self, table: impl Into<String>) -> Self {
        self.key_table = Some(ConfigValue::Literal(table.into()));
        self
    }

    pub fn with_key_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.key_attribute = Some(ConfigValue::Literal(attribute.into()));
        self
    }

    pub fn with_previous_version(mut self, previous: BoxConfig) -> Self {
        self.previous_versions.push(previous);
        self
    }

    pub fn migrating(mut self) -> Self {
        self.meta.migrating = true;
        self
    }

    pub fn attached(mut self) -> Self {
        self.meta.attached = true;
        self
    }
}
