//! Local persistence seam.
//!
//! The engine consumes any durable keyed store through [`LocalStore`]. The
//! store must hand out a live stream per key that yields the current value
//! immediately and again after every `put`/`delete` of that key.
//!
//! [`MemoryStore`] is the in-process implementation: one watch channel per
//! key, so every subscriber sees the latest value and never a stale one.

use crate::error::{StoreError, StoreResult};
use crate::snapshot::StoreSnapshot;
use crate::{Key, Record, Timestamp};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::watch;

/// Live view of one key: `None` while the key is absent or after a delete.
pub type RecordStream = BoxStream<'static, Option<Record>>;

/// Durable keyed storage with change notifications.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Subscribe to a key. The stream yields the current value first.
    async fn get(&self, key: &str) -> StoreResult<RecordStream>;

    /// Insert or replace the record stored under its key.
    async fn put(&self, record: Record) -> StoreResult<()>;

    /// Remove a key. Returns whether a record was present.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Whether a record is stored under `key`.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Every stored record, ordered by key.
    async fn all(&self) -> StoreResult<Vec<Record>>;
}

/// In-memory [`LocalStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: DashMap<Key, watch::Sender<Option<Record>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Current value for `key` without subscribing.
    pub fn peek(&self, key: &str) -> Option<Record> {
        self.slots.get(key).and_then(|slot| slot.borrow().clone())
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().borrow().is_some())
            .count()
    }

    /// Check if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set(&self, key: &str, value: Option<Record>) -> Option<Record> {
        match self.slots.get(key) {
            Some(slot) => slot.send_replace(value),
            None => {
                let slot = self
                    .slots
                    .entry(key.to_string())
                    .or_insert_with(|| watch::channel(None).0);
                slot.send_replace(value)
            }
        }
    }

    fn records_sorted(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .slots
            .iter()
            .filter_map(|slot| slot.value().borrow().clone())
            .collect();
        records.sort_by(|a, b| a.key().cmp(b.key()));
        records
    }

    /// Export every stored record as a snapshot.
    pub fn export_snapshot(&self, exported_at: Timestamp) -> StoreSnapshot {
        let mut snapshot = StoreSnapshot::new(exported_at);
        for record in self.records_sorted() {
            snapshot.add_record(record);
        }
        snapshot
    }

    /// Load a snapshot, notifying subscribers of every imported key.
    ///
    /// Returns the number of records imported.
    pub fn import_snapshot(&self, snapshot: StoreSnapshot) -> StoreResult<usize> {
        snapshot.validate()?;

        let count = snapshot.records.len();
        for (key, record) in snapshot.records {
            self.set(&key, Some(record));
        }

        tracing::debug!(records = count, "Imported store snapshot");
        Ok(count)
    }
}

fn watch_stream(mut rx: watch::Receiver<Option<Record>>) -> RecordStream {
    // Deliver the value present at subscription time as the first item.
    rx.mark_changed();
    futures::stream::unfold(rx, |mut rx| async move {
        rx.changed().await.ok()?;
        let value = rx.borrow_and_update().clone();
        Some((value, rx))
    })
    .boxed()
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<RecordStream> {
        let rx = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe();
        Ok(watch_stream(rx))
    }

    async fn put(&self, record: Record) -> StoreResult<()> {
        let key = record.key().to_string();
        self.set(&key, Some(record));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        // Subscribers keep their slot so a later put reaches them.
        Ok(match self.slots.get(key) {
            Some(slot) => slot.send_replace(None).is_some(),
            None => false,
        })
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.peek(key).is_some())
    }

    async fn all(&self) -> StoreResult<Vec<Record>> {
        Ok(self.records_sorted())
    }
}
