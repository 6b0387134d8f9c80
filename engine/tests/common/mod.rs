//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use notesync_engine::{
    LocalStore, MemoryStore, Record, RecordStream, RemoteClient, RemoteError, StoreError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory remote with scriptable answers and call counters.
#[derive(Default)]
pub struct ScriptedRemote {
    notes: Mutex<HashMap<String, Record>>,
    fetches: Mutex<HashMap<String, u64>>,
    stored: Mutex<Vec<Record>>,
    fail_fetch: AtomicBool,
    fail_store: AtomicBool,
}

impl ScriptedRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `record` the remote copy for its key.
    pub fn set(&self, record: Record) {
        self.notes
            .lock()
            .unwrap()
            .insert(record.key().to_string(), record);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stores(&self, fail: bool) {
        self.fail_store.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_count(&self, key: &str) -> u64 {
        self.fetches.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn stored(&self) -> Vec<Record> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteClient for ScriptedRemote {
    async fn fetch(&self, key: &str) -> Result<Record, RemoteError> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default() += 1;

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("connection refused".into()));
        }

        self.notes
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(key.to_string()))
    }

    async fn store(&self, record: &Record) -> Result<(), RemoteError> {
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("connection reset".into()));
        }
        self.stored.lock().unwrap().push(record.clone());
        self.set(record.clone());
        Ok(())
    }
}

/// [`MemoryStore`] wrapper that records puts and can refuse or stall calls.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    puts: Mutex<Vec<Record>>,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    get_delay: Mutex<Option<Duration>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Make every `get` wait `delay` before subscribing.
    pub fn delay_gets(&self, delay: Duration) {
        *self.get_delay.lock().unwrap() = Some(delay);
    }

    pub fn puts(&self) -> Vec<Record> {
        self.puts.lock().unwrap().clone()
    }

    pub fn peek(&self, key: &str) -> Option<Record> {
        self.inner.peek(key)
    }

    /// Seed a record without it showing up in [`RecordingStore::puts`].
    pub async fn seed(&self, record: Record) {
        self.inner.put(record).await.unwrap();
    }
}

#[async_trait]
impl LocalStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<RecordStream, StoreError> {
        let delay = *self.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::ReadFailed("database locked".into()));
        }
        self.inner.get(key).await
    }

    async fn put(&self, record: Record) -> Result<(), StoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("disk full".into()));
        }
        self.puts.lock().unwrap().push(record.clone());
        self.inner.put(record).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn all(&self) -> Result<Vec<Record>, StoreError> {
        self.inner.all().await
    }
}
