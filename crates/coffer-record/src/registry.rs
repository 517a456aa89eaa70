//! Which attributes and attachments of each model are encrypted.
//!
//! Populated once at model-definition time, then shared read-only.

use coffer_core::{CofferError, CofferResult};
use std::collections::BTreeMap;

use crate::options::BoxConfig;

#[derive(Debug, Clone, Default)]
pub struct ModelEncryption {
    pub attributes: BTreeMap<String, BoxConfig>,
    pub attachments: BTreeMap<String, BoxConfig>,
}

/// Encryption configuration keyed by model name.
#[derive(Debug, Clone, Default)]
pub struct EncryptionRegistry {
    models: BTreeMap<String, ModelEncryption>,
}

impl EncryptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an encrypted column attribute.
    pub fn encrypt_attribute(
        &mut self,
        model: &str,
        attribute: &str,
        config: BoxConfig,
    ) -> CofferResult<()> {
        let entry = self.models.entry(model.to_string()).or_default();
        insert_unique(&mut entry.attributes, model, attribute, config)
    }

    /// Register an encrypted attachment.
    pub fn encrypt_attachment(
        &mut self,
        model: &str,
        name: &str,
        mut config: BoxConfig,
    ) -> CofferResult<()> {
        config.meta.attached = true;
        let entry = self.models.entry(model.to_string()).or_default();
        insert_unique(&mut entry.attachments, model, name, config)
    }

    pub fn model(&self, model: &str) -> Option<&ModelEncryption> {
        self.models.get(model)
    }

    pub fn attribute(&self, model: &str, attribute: &str) -> Option<&BoxConfig> {
        self.models.get(model)?.attributes.get(attribute)
    }

    pub fn attachment(&self, model: &str, name: &str) -> Option<&BoxConfig> {
        self.models.get(model)?.attachments.get(name)
    }

    /// Encrypted attributes of `model` in name order.
    pub fn attributes(&self, model: &str) -> impl Iterator<Item = (&str, &BoxConfig)> {
        self.models
            .get(model)
            .into_iter()
            .flat_map(|m| m.attributes.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn is_encrypted_attachment(&self, model: &str, name: &str) -> bool {
        self.attachment(model, name).is_some()
    }
}

fn insert_unique(
    map: &mut BTreeMap<String, BoxConfig>,
    model: &str,
    name: &str,
    config: BoxConfig,
) -> CofferResult<()> {
    if name.is_empty() {
        return Err(CofferError::config(format!("{model}: empty attribute name")));
    }
    if map.contains_key(name) {
        return Err(CofferError::config(format!(
            "{model}.{name} is already encrypted"
        )));
    }
    map.insert(name.to_string(), config);
    Ok(())
}
