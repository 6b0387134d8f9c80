//! Snapshot types for persisting and restoring local store state.
//!
//! Snapshots are the bridge between the in-memory [`MemoryStore`](crate::MemoryStore)
//! and disk. They serialize deterministically so the same store contents
//! always produce the same bytes.

use crate::error::{StoreError, StoreResult};
use crate::{Key, Record, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time copy of every note in a local store.
///
/// Uses BTreeMap instead of HashMap for deterministic serialization order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// When the snapshot was taken (milliseconds since epoch)
    pub exported_at: Timestamp,
    /// All records keyed by note key
    pub records: BTreeMap<Key, Record>,
}

impl StoreSnapshot {
    /// Create a new empty snapshot.
    pub fn new(exported_at: Timestamp) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            exported_at,
            records: BTreeMap::new(),
        }
    }

    /// Add a record to the snapshot, replacing any with the same key.
    pub fn add_record(&mut self, record: Record) {
        self.records.insert(record.key().to_string(), record);
    }

    /// Get a record from the snapshot.
    pub fn get_record(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Newest timestamp in the snapshot, if any.
    pub fn latest_update(&self) -> Option<Timestamp> {
        self.records.values().map(Record::updated_at).max()
    }

    /// Check the format version and that every entry is stored under its own key.
    ///
    /// Versions from 1 up to [`SNAPSHOT_FORMAT_VERSION`] are readable.
    pub fn validate(&self) -> StoreResult<()> {
        if !(1..=SNAPSHOT_FORMAT_VERSION).contains(&self.format_version) {
            return Err(StoreError::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (supported: 1 to {})",
                self.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        for (key, record) in &self.records {
            if key != record.key() {
                return Err(StoreError::InvalidSnapshot(format!(
                    "entry '{}' holds record for '{}'",
                    key,
                    record.key()
                )));
            }
        }
        Ok(())
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string(self).map_err(|e| StoreError::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> StoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| StoreError::InvalidSnapshot(e.to_string()))?;

        snapshot.validate()?;
        Ok(snapshot)
    }
}
