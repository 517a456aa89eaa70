//! Migration checkpoints: how far each target got.
//!
//! The JSON store keeps every target in one file, loaded into memory and
//! rewritten atomically (temp file, then rename) on each change.

use anyhow::Context;
use coffer_core::CofferResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::RecordFailure;

/// Progress of one target, saved after each batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Highest record id fully processed
    pub last_id: Option<u64>,
    pub scanned: u64,
    pub updated: u64,
    pub current: u64,
    #[serde(default)]
    pub skipped: u64,
    /// Values left unmigrated so far, reported again when the run completes
    #[serde(default)]
    pub failures: Vec<RecordFailure>,
    /// Unix timestamp of the save
    #[serde(default)]
    pub saved_at: u64,
}

pub trait CheckpointStore {
    fn load(&self, target: &str) -> CofferResult<Option<Checkpoint>>;
    fn save(&mut self, target: &str, checkpoint: &Checkpoint) -> CofferResult<()>;
    fn clear(&mut self, target: &str) -> CofferResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    entries: BTreeMap<String, Checkpoint>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, target: &str) -> CofferResult<Option<Checkpoint>> {
        Ok(self.entries.get(target).cloned())
    }

    fn save(&mut self, target: &str, checkpoint: &Checkpoint) -> CofferResult<()> {
        self.entries.insert(target.to_string(), stamped(checkpoint));
        Ok(())
    }

    fn clear(&mut self, target: &str) -> CofferResult<()> {
        self.entries.remove(target);
        Ok(())
    }
}

/// Checkpoints persisted to a JSON file keyed by target name.
#[derive(Debug)]
pub struct JsonCheckpointStore {
    path: PathBuf,
    entries: BTreeMap<String, Checkpoint>,
}

impl JsonCheckpointStore {
    /// Load or create a store at `path`. A missing file starts empty.
    pub fn open(path: &Path) -> CofferResult<Self> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading checkpoints: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing checkpoints: {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every saved checkpoint, by target name.
    pub fn targets(&self) -> impl Iterator<Item = (&str, &Checkpoint)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn flush(&self) -> CofferResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating checkpoint dir: {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(&self.entries).context("serializing checkpoints")?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, &json)
            .with_context(|| format!("writing checkpoints temp: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming checkpoints: {}", self.path.display()))?;
        Ok(())
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn load(&self, target: &str) -> CofferResult<Option<Checkpoint>> {
        Ok(self.entries.get(target).cloned())
    }

    fn save(&mut self, target: &str, checkpoint: &Checkpoint) -> CofferResult<()> {
        self.entries.insert(target.to_string(), stamped(checkpoint));
        self.flush()
    }

    fn clear(&mut self, target: &str) -> CofferResult<()> {
        if self.entries.remove(target).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

fn stamped(checkpoint: &Checkpoint) -> Checkpoint {
    let saved_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Checkpoint {
        saved_at,
        ..checkpoint.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn checkpoint(last_id: u64) -> Checkpoint {
        Checkpoint {
            last_id: Some(last_id),
            scanned: last_id,
            updated: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_json_store_persists_across_open() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/checkpoints.json");

        {
            let mut store = JsonCheckpointStore::open(&path).unwrap();
            assert!(store.load("User").unwrap().is_none());
            store.save("User", &checkpoint(40)).unwrap();
            store.save("Post", &checkpoint(7)).unwrap();
        }

        let mut store = JsonCheckpointStore::open(&path).unwrap();
        let names: Vec<_> = store.targets().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Post", "User"]);
        let user = store.load("User").unwrap().unwrap();
        assert_eq!(user.last_id, Some(40));
        assert!(user.saved_at > 0);

        store.clear("User").unwrap();
        let store = JsonCheckpointStore::open(&path).unwrap();
        assert!(store.load("User").unwrap().is_none());
        assert_eq!(store.load("Post").unwrap().unwrap().last_id, Some(7));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_failures_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("checkpoints.json");
        let failure = RecordFailure {
            id: 2,
            attribute: "email".into(),
            error: "decryption failed".into(),
        };
        {
            let mut store = JsonCheckpointStore::open(&path).unwrap();
            let mut saved = checkpoint(4);
            saved.failures.push(failure.clone());
            store.save("User", &saved).unwrap();
        }
        let store = JsonCheckpointStore::open(&path).unwrap();
        assert_eq!(store.load("User").unwrap().unwrap().failures, vec![failure]);

        // checkpoints written before failures were tracked still load
        std::fs::write(
            &path,
            r#"{"User":{"last_id":3,"scanned":3,"updated":1,"current":2}}"#,
        )
        .unwrap();
        let store = JsonCheckpointStore::open(&path).unwrap();
        assert!(store.load("User").unwrap().unwrap().failures.is_empty());
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("checkpoints.json");
        std::fs::write(&path, "not json").unwrap();
        let err = JsonCheckpointStore::open(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing checkpoints"));
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryCheckpointStore::new();
        store.save("User", &checkpoint(3)).unwrap();
        assert_eq!(store.load("User").unwrap().unwrap().scanned, 3);
        store.clear("User").unwrap();
        assert!(store.load("User").unwrap().is_none());
    }
}
