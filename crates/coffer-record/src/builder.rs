//! Box resolution: [`BoxConfig`] + record → [`Encryptor`].

use coffer_core::config::BoxDefaults;
use coffer_core::{master_key, CofferError, CofferResult};
use coffer_crypto::cipher_box::KeyBytes;
use coffer_crypto::{attribute_key, derive_attribute_key, Algorithm, BoxOptions, Encryptor};
use zeroize::Zeroizing;

use crate::context::RecordContext;
use crate::options::{BoxConfig, ConfigValue};

/// Resolves per-attribute configuration into concrete boxes.
///
/// The master key used for derivation is, in order: the config's own
/// `master_key` override, the builder's key, then the process master key.
#[derive(Clone)]
pub struct BoxBuilder {
    master_key: Option<KeyBytes>,
    use_process_key: bool,
    default_algorithm: Option<Algorithm>,
    default_padding: Option<usize>,
}

impl Default for BoxBuilder {
    fn default() -> Self {
        Self {
            master_key: None,
            use_process_key: true,
            default_algorithm: None,
            default_padding: None,
        }
    }
}

impl std::fmt::Debug for BoxBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxBuilder")
            .field("master_key", &self.master_key.as_ref().map(|_| "[REDACTED]"))
            .field("use_process_key", &self.use_process_key)
            .field("default_algorithm", &self.default_algorithm)
            .field("default_padding", &self.default_padding)
            .finish()
    }
}

impl BoxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_master_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.master_key = Some(Zeroizing::new(key.into()));
        self
    }

    /// Never fall back to the process master key.
    pub fn without_process_key(mut self) -> Self {
        self.use_process_key = false;
        self
    }

    /// Apply `[defaults]` from the config file to symmetric boxes.
    pub fn with_defaults(mut self, defaults: &BoxDefaults) -> CofferResult<Self> {
        let algorithm: Algorithm = defaults.algorithm.parse()?;
        if algorithm == Algorithm::Hybrid {
            return Err(CofferError::config(
                "default algorithm must be symmetric (aes-gcm or xchacha20)",
            ));
        }
        self.default_algorithm = Some(algorithm);
        self.default_padding = (defaults.padding > 0).then_some(defaults.padding);
        Ok(self)
    }

    /// Fail unless some master key can serve every derivation `config` must make.
    ///
    /// Only configs that never name a key are checked; a per-record key that
    /// resolves to null is a problem of that record alone.
    pub fn check_master_key(&self, config: &BoxConfig) -> CofferResult<()> {
        let available = config.master_key.is_some()
            || self.master_key.is_some()
            || (self.use_process_key && master_key::master_key().is_some());
        if config.always_derives() && !available {
            return Err(CofferError::config("missing master key"));
        }
        config
            .previous_versions
            .iter()
            .try_for_each(|previous| self.check_master_key(previous))
    }

    /// Resolve `config` against `ctx` into fully specified box options.
    ///
    /// Host bookkeeping in [`BoxConfig::meta`] never reaches the options.
    pub fn resolve(
        &self,
        ctx: &dyn RecordContext,
        config: &BoxConfig,
        table: &str,
        attribute: &str,
    ) -> CofferResult<BoxOptions> {
        let resolve_key = |v: &Option<ConfigValue<KeyBytes>>| -> CofferResult<Option<KeyBytes>> {
            match v {
                Some(v) => v.resolve(ctx),
                None => Ok(None),
            }
        };

        let mut options = BoxOptions {
            key: resolve_key(&config.key)?,
            encryption_key: resolve_key(&config.encryption_key)?,
            decryption_key: resolve_key(&config.decryption_key)?,
            ..BoxOptions::default()
        };

        options.algorithm = match &config.algorithm {
            Some(v) => v.resolve(ctx)?,
            None => None,
        };
        let key_pair = options.encryption_key.is_some() || options.decryption_key.is_some();
        if options.algorithm.is_none() && !key_pair {
            options.algorithm = self.default_algorithm;
        }

        options.padding = match &config.padding {
            Some(v) => v.resolve(ctx)?.filter(|&block| block > 0),
            None => self.default_padding,
        };

        if !options.has_key_material() {
            let key_table = match &config.key_table {
                Some(v) => v.resolve(ctx)?,
                None => None,
            };
            let key_attribute = match &config.key_attribute {
                Some(v) => v.resolve(ctx)?,
                None => None,
            };
            let table = key_table.as_deref().unwrap_or(table);
            let attribute = key_attribute.as_deref().unwrap_or(attribute);

            tracing::debug!(table, attribute, "deriving attribute key");
            let derived = match resolve_key(&config.master_key)?.or_else(|| self.master_key.clone())
            {
                Some(master) => derive_attribute_key(&master, table, attribute)?,
                None if self.use_process_key => attribute_key(table, attribute, None)?,
                None => return Err(CofferError::config("missing master key")),
            };
            options.key = Some(Zeroizing::new(derived.as_bytes().to_vec()));
        }

        options.previous_versions = config
            .previous_versions
            .iter()
            .map(|previous| self.resolve(ctx, previous, table, attribute))
            .collect::<CofferResult<Vec<_>>>()?;

        Ok(options)
    }

    /// Resolve and construct the box for one attribute of `ctx`.
    pub fn build_box(
        &self,
        ctx: &dyn RecordContext,
        config: &BoxConfig,
        table: &str,
        attribute: &str,
    ) -> CofferResult<Encryptor> {
        Encryptor::new(&self.resolve(ctx, config, table, attribute)?)
    }
}

/// Build a box with no defaults beyond the process master key.
pub fn build_box(
    ctx: &dyn RecordContext,
    config: &BoxConfig,
    table: &str,
    attribute: &str,
) -> CofferResult<Encryptor> {
    BoxBuilder::default().build_box(ctx, config, table, attribute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LookupValue;
    use crate::memory::MemoryRecord;
    use coffer_crypto::generate_key_pair;

    const MASTER: &str = "0101010101010101010101010101010101010101010101010101010101010101";
    const KEY_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const KEY_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn user() -> MemoryRecord {
        MemoryRecord::new("User", "users", 1)
            .with_field("tenant_key", LookupValue::Text(KEY_B.into()))
            .with_field("no_key", LookupValue::Null)
    }

    fn builder() -> BoxBuilder {
        BoxBuilder::new().with_master_key(MASTER).without_process_key()
    }

    #[test]
    fn test_deferred_key_used_exactly() {
        let config = BoxConfig::derived().with_key(ConfigValue::<KeyBytes>::deferred(|ctx| {
            assert_eq!(ctx.table_name(), "users");
            Ok(Zeroizing::new(KEY_A.as_bytes().to_vec()))
        }));
        let options = builder().resolve(&user(), &config, "users", "email").unwrap();
        assert_eq!(options.key.as_deref().map(Vec::as_slice), Some(KEY_A.as_bytes()));

        let built = builder().build_box(&user(), &config, "users", "email").unwrap();
        let ct = built.encrypt(b"x").unwrap();
        let by_key = coffer_crypto::encryptor(&BoxOptions::with_key(KEY_A)).unwrap();
        assert_eq!(by_key.decrypt(&ct).unwrap(), b"x");
    }

    #[test]
    fn test_named_lookup_key() {
        let config = BoxConfig::derived().with_key(ConfigValue::<KeyBytes>::named("tenant_key"));
        let options = builder().resolve(&user(), &config, "users", "email").unwrap();
        assert_eq!(options.key.as_deref().map(Vec::as_slice), Some(KEY_B.as_bytes()));
    }

    #[test]
    fn test_fallback_matches_derivation() {
        let options = builder()
            .resolve(&user(), &BoxConfig::derived(), "users", "email")
            .unwrap();
        let expected = derive_attribute_key(MASTER.as_bytes(), "users", "email").unwrap();
        assert_eq!(options.key.unwrap().as_slice(), expected.as_bytes());
        assert_eq!(options.algorithm, None);
    }

    #[test]
    fn test_named_null_falls_back_to_derivation() {
        let config = BoxConfig::derived().with_key(ConfigValue::<KeyBytes>::named("no_key"));
        let options = builder().resolve(&user(), &config, "users", "email").unwrap();
        let expected = derive_attribute_key(MASTER.as_bytes(), "users", "email").unwrap();
        assert_eq!(options.key.unwrap().as_slice(), expected.as_bytes());
    }

    #[test]
    fn test_master_key_override_shadows_builder() {
        let config = BoxConfig::derived().with_master_key(KEY_A);
        let options = builder().resolve(&user(), &config, "users", "email").unwrap();
        let expected = derive_attribute_key(KEY_A.as_bytes(), "users", "email").unwrap();
        assert_eq!(options.key.unwrap().as_slice(), expected.as_bytes());
    }

    #[test]
    fn test_key_table_and_attribute_overrides() {
        let config = BoxConfig::derived()
            .with_key_table("people")
            .with_key_attribute("email_address");
        let options = builder().resolve(&user(), &config, "users", "email").unwrap();
        let expected = derive_attribute_key(MASTER.as_bytes(), "people", "email_address").unwrap();
        assert_eq!(options.key.unwrap().as_slice(), expected.as_bytes());
    }

    #[test]
    fn test_missing_master_key() {
        let err = BoxBuilder::new()
            .without_process_key()
            .resolve(&user(), &BoxConfig::derived(), "users", "email")
            .unwrap_err();
        assert!(matches!(err, CofferError::Configuration(_)));
        assert!(err.to_string().contains("missing master key"));
    }

    #[test]
    fn test_check_master_key() {
        let isolated = BoxBuilder::new().without_process_key();
        assert!(isolated.check_master_key(&BoxConfig::derived()).is_err());
        isolated
            .check_master_key(&BoxConfig::derived().with_key(ConfigValue::<KeyBytes>::named("k")))
            .unwrap();
        isolated
            .check_master_key(&BoxConfig::derived().with_master_key(KEY_A))
            .unwrap();
        builder().check_master_key(&BoxConfig::derived()).unwrap();

        let stale = BoxConfig::derived()
            .with_key(KEY_A)
            .with_previous_version(BoxConfig::derived());
        assert!(isolated.check_master_key(&stale).is_err());
    }

    #[test]
    fn test_explicit_key_ignores_master_override() {
        let config = BoxConfig::derived().with_key(KEY_A).with_master_key(KEY_B);
        let options = BoxBuilder::new()
            .without_process_key()
            .resolve(&user(), &config, "users", "email")
            .unwrap();
        assert_eq!(options.key.unwrap().as_slice(), KEY_A.as_bytes());
    }

    #[test]
    fn test_defaults_apply_to_symmetric_only() {
        let defaults = BoxDefaults {
            algorithm: "xchacha20".into(),
            padding: 16,
        };
        let b = builder().with_defaults(&defaults).unwrap();
        let options = b.resolve(&user(), &BoxConfig::derived(), "users", "email").unwrap();
        assert_eq!(options.algorithm, Some(Algorithm::XChaCha20));
        assert_eq!(options.padding, Some(16));

        let pair = generate_key_pair();
        let config = BoxConfig::derived()
            .with_encryption_key(pair.encryption_key.as_str())
            .with_decryption_key(pair.decryption_key.as_str());
        let options = b.resolve(&user(), &config, "users", "email").unwrap();
        assert_eq!(options.resolved_algorithm(), Algorithm::Hybrid);
        b.build_box(&user(), &config, "users", "email").unwrap();
    }

    #[test]
    fn test_padding_false_disables_default() {
        let defaults = BoxDefaults {
            algorithm: "aes-gcm".into(),
            padding: 16,
        };
        let config = BoxConfig::derived().with_padding(ConfigValue::Literal(0));
        let options = builder()
            .with_defaults(&defaults)
            .unwrap()
            .resolve(&user(), &config, "users", "email")
            .unwrap();
        assert_eq!(options.padding, None);
    }

    #[test]
    fn test_hybrid_default_rejected() {
        let defaults = BoxDefaults {
            algorithm: "hybrid".into(),
            padding: 0,
        };
        assert!(builder().with_defaults(&defaults).is_err());
    }

    #[test]
    fn test_previous_versions_resolved() {
        let config = BoxConfig::derived()
            .with_key(KEY_A)
            .with_previous_version(BoxConfig::derived().with_algorithm(Algorithm::XChaCha20));
        let options = builder().resolve(&user(), &config, "users", "email").unwrap();
        assert_eq!(options.previous_versions.len(), 1);
        let previous = &options.previous_versions[0];
        let expected = derive_attribute_key(MASTER.as_bytes(), "users", "email").unwrap();
        assert_eq!(previous.key.as_ref().unwrap().as_slice(), expected.as_bytes());
        assert_eq!(previous.algorithm, Some(Algorithm::XChaCha20));
    }
}
