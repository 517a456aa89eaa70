//! In-memory host adapter: records as field maps and a table of them.
//!
//! Backs tests and tools that have no real record framework to plug in.

use coffer_core::{CofferError, CofferResult};
use std::collections::BTreeMap;

use crate::context::{LookupValue, RecordContext};
use crate::migrate::{MigratableRecord, RecordStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    id: u64,
    model: String,
    table: String,
    fields: BTreeMap<String, LookupValue>,
}

impl MemoryRecord {
    pub fn new(model: impl Into<String>, table: impl Into<String>, id: u64) -> Self {
        Self {
            id,
            model: model.into(),
            table: table.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: LookupValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: LookupValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&LookupValue> {
        self.fields.get(name)
    }
}

impl RecordContext for MemoryRecord {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn lookup(&self, name: &str) -> Option<LookupValue> {
        self.fields.get(name).cloned()
    }
}

impl MigratableRecord for MemoryRecord {
    fn id(&self) -> u64 {
        self.id
    }
}

/// A table of [`MemoryRecord`]s ordered by id.
#[derive(Debug, Clone)]
pub struct MemoryRecordStore {
    model: String,
    table: String,
    records: BTreeMap<u64, MemoryRecord>,
    writes: usize,
    write_limit: Option<usize>,
}

impl MemoryRecordStore {
    pub fn new(model: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            table: table.into(),
            records: BTreeMap::new(),
            writes: 0,
            write_limit: None,
        }
    }

    /// Insert a new record with `fields`, returning it.
    pub fn insert(&mut self, id: u64, fields: impl IntoIterator<Item = (String, LookupValue)>) -> &MemoryRecord {
        let mut record = MemoryRecord::new(self.model.clone(), self.table.clone(), id);
        for (name, value) in fields {
            record.set(name, value);
        }
        self.records.insert(id, record);
        &self.records[&id]
    }

    pub fn get(&self, id: u64) -> Option<&MemoryRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes accepted so far.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Fail every write once `limit` writes have been accepted.
    pub fn fail_writes_after(&mut self, limit: Option<usize>) {
        self.write_limit = limit;
    }
}

impl RecordStore for MemoryRecordStore {
    type Record = MemoryRecord;

    fn model_name(&self) -> &str {
        &self.model
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn scan(&self, after: Option<u64>, limit: usize) -> CofferResult<Vec<MemoryRecord>> {
        let records = match after {
            Some(id) => self
                .records
                .range((std::ops::Bound::Excluded(id), std::ops::Bound::Unbounded))
                .take(limit)
                .map(|(_, r)| r.clone())
                .collect(),
            None => self.records.values().take(limit).cloned().collect(),
        };
        Ok(records)
    }

    fn write(&mut self, id: u64, column: &str, value: LookupValue) -> CofferResult<()> {
        if self.write_limit.is_some_and(|limit| self.writes >= limit) {
            return Err(CofferError::Io(std::io::Error::other(format!(
                "{}: write to record {id} rejected",
                self.table
            ))));
        }
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| CofferError::config(format!("{}: no record {id}", self.table)))?;
        record.set(column, value);
        self.writes += 1;
        Ok(())
    }
}
