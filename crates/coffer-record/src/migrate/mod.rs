//! Re-encryption of stored attribute values under the current configuration.
//!
//! ```text
//! Idle ──▶ Scanning ◀──▶ Migrating ──▶ Completed
//!              │              │
//!              └──────┬───────┘
//!                     ▼
//!                  Failed
//! ```
//!
//! Records are visited in ascending id order, one batch at a time, and the
//! cursor is checkpointed after every batch. A value that the primary box
//! already opens is left alone, so rerunning a finished or interrupted
//! migration never rewrites it.

pub mod checkpoint;

pub use checkpoint::{Checkpoint, CheckpointStore, JsonCheckpointStore, MemoryCheckpointStore};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use coffer_core::config::MigrationConfig;
use coffer_core::{CofferError, CofferResult};
use coffer_crypto::{DecryptedWith, Encryptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Mutex;
use zeroize::Zeroizing;

use crate::builder::BoxBuilder;
use crate::context::{LookupValue, RecordContext};
use crate::options::BoxConfig;
use crate::registry::EncryptionRegistry;

/// A persisted record the migrator can address.
pub trait MigratableRecord: RecordContext {
    fn id(&self) -> u64;
}

/// Read/write access to one table of the host framework.
pub trait RecordStore {
    type Record: MigratableRecord;

    fn model_name(&self) -> &str;
    fn table_name(&self) -> &str;

    /// Up to `limit` records with id greater than `after`, ascending.
    fn scan(&self, after: Option<u64>, limit: usize) -> CofferResult<Vec<Self::Record>>;

    /// Store `value` in `column` of record `id`.
    fn write(&mut self, id: u64, column: &str, value: LookupValue) -> CofferResult<()>;
}

/// A model plus the encrypted attributes to migrate.
#[derive(Debug, Clone)]
pub struct MigrationTarget {
    model: String,
    attributes: Vec<(String, BoxConfig)>,
}

impl MigrationTarget {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, config: BoxConfig) -> Self {
        self.attributes.push((name.into(), config));
        self
    }

    /// Every encrypted attribute registered for `model`.
    pub fn from_registry(registry: &EncryptionRegistry, model: &str) -> CofferResult<Self> {
        let attributes: Vec<_> = registry
            .attributes(model)
            .map(|(name, config)| (name.to_string(), config.clone()))
            .collect();
        if attributes.is_empty() {
            return Err(CofferError::config(format!(
                "{model} has no encrypted attributes"
            )));
        }
        Ok(Self {
            model: model.to_string(),
            attributes,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Idle,
    Scanning,
    Migrating,
    Completed,
    Failed,
}

/// A value that could not be migrated: no configured box opened it, or the
/// record's own values did not resolve to a usable box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub id: u64,
    pub attribute: String,
    pub error: String,
}

/// Outcome of a run. Counters and failures include progress resumed from a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub state: MigrationState,
    /// Records visited
    pub scanned: u64,
    /// Attribute values written
    pub updated: u64,
    /// Attribute values already under the primary box
    pub current: u64,
    /// Attribute values with nothing stored
    pub skipped: u64,
    pub failures: Vec<RecordFailure>,
}

enum Outcome {
    Current,
    Updated,
    Skipped,
    /// The record's own configuration values are unusable.
    Rejected(CofferError),
}

/// Drives re-encryption of one target at a time.
#[derive(Debug)]
pub struct Migrator {
    builder: BoxBuilder,
    batch_size: usize,
    state: MigrationState,
}

impl Migrator {
    pub fn new(builder: BoxBuilder) -> Self {
        Self {
            builder,
            batch_size: MigrationConfig::default().batch_size,
            state: MigrationState::Idle,
        }
    }

    pub fn with_config(builder: BoxBuilder, config: &MigrationConfig) -> Self {
        Self::new(builder).with_batch_size(config.batch_size)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Migrate every record of `target` in `store`.
    ///
    /// With `restart = false` the run resumes after the last checkpoint,
    /// carrying its counters and failures forward. Undecryptable values and
    /// records whose own key material does not resolve are reported and
    /// skipped. Systemic errors (a missing master key, a bad literal option,
    /// storage) stop the run in `Failed`, keeping the checkpoint for the next
    /// attempt.
    pub fn migrate<S: RecordStore>(
        &mut self,
        target: &MigrationTarget,
        store: &mut S,
        checkpoints: &mut dyn CheckpointStore,
        restart: bool,
    ) -> CofferResult<MigrationReport> {
        self.state = MigrationState::Idle;
        if store.model_name() != target.model {
            return Err(CofferError::config(format!(
                "store holds {} records, target is {}",
                store.model_name(),
                target.model
            )));
        }
        let _guard = ActiveTarget::acquire(&target.model)?;

        let resumed = if restart {
            checkpoints.clear(&target.model)?;
            None
        } else {
            checkpoints.load(&target.model)?
        };
        let mut progress = resumed.unwrap_or_default();

        tracing::info!(
            model = %target.model,
            table = store.table_name(),
            resume_after = ?progress.last_id,
            batch_size = self.batch_size,
            "migration starting"
        );

        match self.run(target, store, checkpoints, &mut progress) {
            Ok(()) => {
                checkpoints.clear(&target.model)?;
                self.state = MigrationState::Completed;
                tracing::info!(
                    model = %target.model,
                    scanned = progress.scanned,
                    updated = progress.updated,
                    failures = progress.failures.len(),
                    "migration completed"
                );
                Ok(MigrationReport {
                    state: self.state,
                    scanned: progress.scanned,
                    updated: progress.updated,
                    current: progress.current,
                    skipped: progress.skipped,
                    failures: progress.failures,
                })
            }
            Err(e) => {
                self.state = MigrationState::Failed;
                if let Err(save_err) = checkpoints.save(&target.model, &progress) {
                    tracing::warn!("failed to save checkpoint after error: {save_err}");
                }
                tracing::error!(
                    model = %target.model,
                    last_id = ?progress.last_id,
                    "migration failed: {e}"
                );
                Err(e)
            }
        }
    }

    fn run<S: RecordStore>(
        &mut self,
        target: &MigrationTarget,
        store: &mut S,
        checkpoints: &mut dyn CheckpointStore,
        progress: &mut Checkpoint,
    ) -> CofferResult<()> {
        for (_, config) in &target.attributes {
            self.builder.check_master_key(config)?;
        }

        loop {
            self.state = MigrationState::Scanning;
            let batch = store.scan(progress.last_id, self.batch_size)?;
            if batch.is_empty() {
                return Ok(());
            }

            self.state = MigrationState::Migrating;
            for record in &batch {
                // Committed only once every attribute of the record is done,
                // so a resumed run never counts a value twice.
                let mut done = RecordProgress::default();
                for (attribute, config) in &target.attributes {
                    let error = match self.migrate_value(store, record, attribute, config) {
                        Ok(Outcome::Current) => {
                            done.current += 1;
                            continue;
                        }
                        Ok(Outcome::Updated) => {
                            done.updated += 1;
                            continue;
                        }
                        Ok(Outcome::Skipped) => {
                            done.skipped += 1;
                            continue;
                        }
                        Ok(Outcome::Rejected(e)) => e,
                        Err(e) if e.is_systemic() => return Err(e),
                        Err(e) => e,
                    };
                    tracing::warn!(id = record.id(), attribute = %attribute, "cannot migrate value: {error}");
                    done.failures.push(RecordFailure {
                        id: record.id(),
                        attribute: attribute.clone(),
                        error: error.to_string(),
                    });
                }
                done.commit(progress, record.id());
            }

            checkpoints.save(&target.model, progress)?;
            tracing::debug!(model = %target.model, last_id = ?progress.last_id, "batch checkpointed");

            if batch.len() < self.batch_size {
                return Ok(());
            }
        }
    }

    fn migrate_value<S: RecordStore>(
        &self,
        store: &mut S,
        record: &S::Record,
        attribute: &str,
        config: &BoxConfig,
    ) -> CofferResult<Outcome> {
        let encryptor = match self
            .builder
            .build_box(record, config, store.table_name(), attribute)
        {
            Ok(encryptor) => encryptor,
            Err(e @ CofferError::Configuration(_)) if config.reads_record() => {
                return Ok(Outcome::Rejected(e))
            }
            Err(e) => return Err(e),
        };
        let column = ciphertext_column(attribute, config);
        let encode = config.meta.encode;

        let ciphertext = match record.lookup(&column) {
            None | Some(LookupValue::Null) => None,
            Some(LookupValue::Bytes(b)) => Some(b),
            Some(LookupValue::Text(t)) if encode => Some(STANDARD.decode(t.as_bytes()).map_err(
                |e| CofferError::decryption(format!("invalid base64 in {column}: {e}")),
            )?),
            Some(LookupValue::Text(t)) => Some(t.into_bytes()),
            Some(other) => {
                return Err(CofferError::decryption(format!(
                    "{column} holds {other:?}, not ciphertext"
                )))
            }
        };

        match ciphertext {
            Some(ciphertext) => {
                let (plaintext, opened_with) = encryptor.decrypt_detailed(&ciphertext, &[])?;
                let plaintext = Zeroizing::new(plaintext);
                match opened_with {
                    DecryptedWith::Primary => Ok(Outcome::Current),
                    DecryptedWith::Previous(version) => {
                        tracing::debug!(id = record.id(), attribute, version, "re-encrypting");
                        store.write(record.id(), &column, seal(&encryptor, &plaintext, encode)?)?;
                        Ok(Outcome::Updated)
                    }
                }
            }
            None if config.meta.migrating => {
                let plaintext = match record.lookup(attribute) {
                    Some(LookupValue::Text(t)) => Zeroizing::new(t.into_bytes()),
                    Some(LookupValue::Bytes(b)) => Zeroizing::new(b),
                    Some(LookupValue::Integer(i)) => Zeroizing::new(i.to_string().into_bytes()),
                    Some(LookupValue::Bool(b)) => Zeroizing::new(b.to_string().into_bytes()),
                    None | Some(LookupValue::Null) => return Ok(Outcome::Skipped),
                };
                tracing::debug!(id = record.id(), attribute, "encrypting plaintext column");
                store.write(record.id(), &column, seal(&encryptor, &plaintext, encode)?)?;
                Ok(Outcome::Updated)
            }
            None => Ok(Outcome::Skipped),
        }
    }
}

/// Counters for one record, folded into the checkpoint when it finishes.
#[derive(Default)]
struct RecordProgress {
    updated: u64,
    current: u64,
    skipped: u64,
    failures: Vec<RecordFailure>,
}

impl RecordProgress {
    fn commit(self, progress: &mut Checkpoint, id: u64) {
        progress.scanned += 1;
        progress.updated += self.updated;
        progress.current += self.current;
        progress.skipped += self.skipped;
        progress.failures.extend(self.failures);
        progress.last_id = Some(id);
    }
}

/// Column holding the ciphertext of `attribute`.
pub fn ciphertext_column(attribute: &str, config: &BoxConfig) -> String {
    config
        .meta
        .encrypted_attribute
        .clone()
        .unwrap_or_else(|| format!("{attribute}_ciphertext"))
}

fn seal(encryptor: &Encryptor, plaintext: &[u8], encode: bool) -> CofferResult<LookupValue> {
    if encode {
        encryptor.encrypt_base64(plaintext).map(LookupValue::Text)
    } else {
        encryptor.encrypt(plaintext).map(LookupValue::Bytes)
    }
}

static ACTIVE_TARGETS: Mutex<BTreeSet<String>> = Mutex::new(BTreeSet::new());

/// Held while a target is being migrated in this process.
struct ActiveTarget(String);

impl ActiveTarget {
    fn acquire(model: &str) -> CofferResult<Self> {
        let mut active = ACTIVE_TARGETS.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(model.to_string()) {
            return Err(CofferError::MigrationInProgress(model.to_string()));
        }
        Ok(Self(model.to_string()))
    }
}

impl Drop for ActiveTarget {
    fn drop(&mut self) {
        let mut active = ACTIVE_TARGETS.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_target_is_exclusive() {
        let first = ActiveTarget::acquire("GuardTest").unwrap();
        assert!(matches!(
            ActiveTarget::acquire("GuardTest"),
            Err(CofferError::MigrationInProgress(_))
        ));
        ActiveTarget::acquire("OtherGuardTest").unwrap();
        drop(first);
        ActiveTarget::acquire("GuardTest").unwrap();
    }

    #[test]
    fn test_ciphertext_column() {
        let mut config = BoxConfig::derived();
        assert_eq!(ciphertext_column("email", &config), "email_ciphertext");
        config.meta.encrypted_attribute = Some("enc_email".into());
        assert_eq!(ciphertext_column("email", &config), "enc_email");
    }

    #[test]
    fn test_from_registry_requires_attributes() {
        let mut reg = EncryptionRegistry::new();
        assert!(MigrationTarget::from_registry(&reg, "User").is_err());
        reg.encrypt_attribute("User", "email", BoxConfig::derived()).unwrap();
        reg.encrypt_attribute("User", "phone", BoxConfig::derived()).unwrap();
        let target = MigrationTarget::from_registry(&reg, "User").unwrap();
        assert_eq!(target.attribute_names().collect::<Vec<_>>(), vec!["email", "phone"]);
    }
}
