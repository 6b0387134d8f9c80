//! The sync engine.
//!
//! [`SyncEngine`] merges a key's local change stream and its remote poll
//! results into one de-duplicated, monotonically ordered view.
//!
//! # Per-key lifecycle
//!
//! The first [`SyncEngine::observe`] of a key opens a channel for it:
//! - an actor task that owns the key's [`MergeState`] and is the only writer
//!   of the published value
//! - a [`Poller`] feeding remote results to that actor
//!
//! Further observers share the channel. Releasing the last observer stops the
//! poller and the actor while the registry entry is still locked, so no one
//! can attach to a half-stopped channel.

use crate::clock::{Clock, Stamper, SystemClock};
use crate::config::ConfigError;
use crate::error::{Error, Result};
use crate::merge::{MergeState, MergeStats};
use crate::poller::{PollResult, Poller};
use crate::record::Origin;
use crate::{Key, LocalStore, Record, RemoteClient, SyncConfig, Timestamp};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, Stream, StreamExt};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Out-of-band status for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// A poll returned the remote copy
    Fetched { updated_at: Timestamp },
    /// A poll found no remote copy
    NotFound,
    /// Background work for the key failed; syncing continues.
    ///
    /// - [`Error::RemoteFetchFailed`]: a poll failed
    /// - [`Error::LocalWriteFailed`]: a merged remote record was not persisted
    /// - [`Error::RemoteWriteFailed`]: a detached write was not published
    /// - [`Error::LocalReadFailed`]: the local change stream could not be opened
    Failed(Error),
}

impl SyncStatus {
    /// The error carried by a failure status.
    pub fn error(&self) -> Option<&Error> {
        match self {
            SyncStatus::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// A status update tagged with its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub key: Key,
    pub status: SyncStatus,
}

struct Inner {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteClient>,
    stamper: Arc<Stamper<dyn Clock>>,
    config: SyncConfig,
    channels: DashMap<Key, KeyChannel>,
    status: broadcast::Sender<StatusEvent>,
}

/// Everything that exists for an observed key.
struct KeyChannel {
    observers: usize,
    merged: watch::Receiver<Option<Record>>,
    stats: Arc<Mutex<MergeStats>>,
    poller: Poller,
    actor: JoinHandle<()>,
}

impl KeyChannel {
    fn shutdown(&self) {
        self.poller.stop();
        self.actor.abort();
    }
}

impl Drop for KeyChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn open_channel(&self, key: &str) -> KeyChannel {
        let (merged_tx, merged_rx) = watch::channel(None);
        let (remote_tx, remote_rx) = watch::channel(None);
        let stats = Arc::new(Mutex::new(MergeStats::default()));

        let actor = KeyActor {
            key: key.to_string(),
            state: MergeState::new(self.config.merge_policy()),
            local: self.local.clone(),
            stamper: self.stamper.clone(),
            merged: merged_tx,
            status: self.status.clone(),
            stats: stats.clone(),
        };
        let actor = tokio::spawn(actor.run(remote_rx));

        let poller = Poller::start(
            key,
            self.config.poll_period(),
            self.config.fetch_timeout(),
            self.remote.clone(),
            move |result| {
                // Only the newest result is kept for an actor that falls behind.
                remote_tx.send_replace(Some(result));
            },
        );

        KeyChannel {
            observers: 0,
            merged: merged_rx,
            stats,
            poller,
            actor,
        }
    }

    fn release_key(&self, key: &str) {
        if let Entry::Occupied(mut entry) = self.channels.entry(key.to_string()) {
            let channel = entry.get_mut();
            channel.observers = channel.observers.saturating_sub(1);

            if channel.observers == 0 {
                channel.shutdown();
                entry.remove();
                tracing::info!(key = %key, "Last observer released; sync stopped");
            } else {
                tracing::debug!(key = %key, observers = channel.observers, "Observer released");
            }
        }
    }

    fn report(&self, key: &str, status: SyncStatus) {
        let _ = self.status.send(StatusEvent {
            key: key.to_string(),
            status,
        });
    }
}

/// Single writer of one key's merged value.
struct KeyActor {
    key: Key,
    state: MergeState,
    local: Arc<dyn LocalStore>,
    stamper: Arc<Stamper<dyn Clock>>,
    merged: watch::Sender<Option<Record>>,
    status: broadcast::Sender<StatusEvent>,
    stats: Arc<Mutex<MergeStats>>,
}

impl KeyActor {
    async fn run(mut self, mut remote: watch::Receiver<Option<PollResult>>) {
        // Without a local stream the key still follows the remote.
        let mut local = match self.local.get(&self.key).await {
            Ok(changes) => changes.fuse(),
            Err(err) => {
                tracing::error!(key = %self.key, "Failed to subscribe to local store: {}", err);
                self.report(SyncStatus::Failed(Error::LocalReadFailed(err)));
                stream::empty().boxed().fuse()
            }
        };

        // The store yields its current value first. Merging it before any poll
        // result keeps the local copy on a timestamp tie.
        if let Some(Some(record)) = local.next().await {
            self.merge(record, Origin::Local).await;
        }

        loop {
            tokio::select! {
                biased;

                Some(change) = local.next() => {
                    // Deletions stop merging; the last merged value stays published.
                    if let Some(record) = change {
                        self.merge(record, Origin::Local).await;
                    }
                }
                Ok(()) = remote.changed() => {
                    let result = remote.borrow_and_update().clone();
                    if let Some(result) = result {
                        self.on_poll(result).await;
                    }
                }
                else => break,
            }
        }

        tracing::debug!(key = %self.key, "Sync actor finished");
    }

    async fn on_poll(&mut self, result: PollResult) {
        match result {
            PollResult::Fetched(record) => {
                self.report(SyncStatus::Fetched {
                    updated_at: record.updated_at(),
                });
                self.merge(record, Origin::Remote).await;
            }
            PollResult::NotFound => self.report(SyncStatus::NotFound),
            PollResult::Failed(source) => {
                self.report(SyncStatus::Failed(Error::RemoteFetchFailed {
                    key: self.key.clone(),
                    source,
                }));
            }
        }
    }

    async fn merge(&mut self, record: Record, origin: Origin) {
        let decision = self.state.offer(record.clone(), origin);
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner) = self.state.stats();

        if !decision.is_accepted() {
            tracing::trace!(
                key = %self.key,
                updated_at = record.updated_at(),
                ?origin,
                ?decision,
                "Discarded incoming note"
            );
            return;
        }

        tracing::debug!(
            key = %self.key,
            updated_at = record.updated_at(),
            ?origin,
            ?decision,
            "Publishing merged note"
        );

        self.stamper.observe(record.updated_at());
        self.merged.send_replace(Some(record.clone()));

        // The store echoes this put back as a duplicate, which the merge
        // discards; nothing is sent to the remote.
        if origin == Origin::Remote {
            if let Err(err) = self.local.put(record).await {
                tracing::warn!(key = %self.key, "Failed to persist remote note locally: {}", err);
                self.report(SyncStatus::Failed(Error::LocalWriteFailed(err)));
            }
        }
    }

    fn report(&self, status: SyncStatus) {
        let _ = self.status.send(StatusEvent {
            key: self.key.clone(),
            status,
        });
    }
}

/// Keeps notes consistent between a local store and a polled remote.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    /// Create an engine stamping writes with the system clock.
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteClient>,
        config: SyncConfig,
    ) -> std::result::Result<Self, ConfigError> {
        Self::with_clock(local, remote, config, Arc::new(SystemClock))
    }

    /// Create an engine reading time from `clock`.
    ///
    /// Fails if `config` does not pass [`SyncConfig::validated`].
    pub fn with_clock(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteClient>,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, ConfigError> {
        let config = config.validated()?;
        let (status, _) = broadcast::channel(config.status_capacity);

        Ok(Self {
            inner: Arc::new(Inner {
                local,
                remote,
                stamper: Arc::new(Stamper::new(clock)),
                config,
                channels: DashMap::new(),
                status,
            }),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Observe the merged view of `key`.
    ///
    /// Returns immediately; the local subscription and the first fetch happen
    /// in the background. Must be called from within a Tokio runtime.
    pub fn observe(&self, key: impl Into<Key>) -> Subscription {
        let key = key.into();

        let mut merged = {
            let mut channel = self
                .inner
                .channels
                .entry(key.clone())
                .or_insert_with(|| {
                    tracing::info!(key = %key, "Starting sync");
                    self.inner.open_channel(&key)
                });
            channel.observers += 1;
            channel.merged.clone()
        };
        merged.mark_changed();

        Subscription {
            inner: self.inner.clone(),
            key,
            merged,
            status: self.inner.status.subscribe(),
            released: false,
        }
    }

    /// Release an observation. Idempotent; dropping the subscription does the same.
    pub fn release(&self, subscription: &mut Subscription) {
        subscription.release();
    }

    /// Write a note through to the local store and then the remote.
    ///
    /// The record is stamped with a fresh timestamp. A local failure aborts
    /// before the remote is contacted. A remote failure leaves the local
    /// write in place and returns [`Error::RemoteWriteFailed`].
    pub async fn write(&self, key: impl Into<Key>, content: impl Into<String>) -> Result<Record> {
        let record = self.commit_local(key.into(), content.into()).await?;
        self.publish(&record).await?;
        Ok(record)
    }

    /// Write a note locally and publish it to the remote in the background.
    ///
    /// Returns once the local write is durable. A failed publish is reported
    /// as [`Error::RemoteWriteFailed`] in a [`SyncStatus::Failed`] status.
    pub async fn write_detached(
        &self,
        key: impl Into<Key>,
        content: impl Into<String>,
    ) -> Result<Record> {
        let record = self.commit_local(key.into(), content.into()).await?;

        let engine = self.clone();
        let published = record.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.publish(&published).await {
                engine.inner.report(published.key(), SyncStatus::Failed(err));
            }
        });

        Ok(record)
    }

    /// Send an already committed record to the remote.
    ///
    /// This is the retry path for [`Error::RemoteWriteFailed`].
    pub async fn publish(&self, record: &Record) -> Result<()> {
        match self.inner.remote.store(record).await {
            Ok(()) => {
                tracing::debug!(
                    key = %record.key(),
                    updated_at = record.updated_at(),
                    "Published note"
                );
                Ok(())
            }
            Err(source) => {
                tracing::warn!(key = %record.key(), "Remote publish failed: {}", source);
                Err(Error::RemoteWriteFailed {
                    record: Box::new(record.clone()),
                    source,
                })
            }
        }
    }

    async fn commit_local(&self, key: Key, content: String) -> Result<Record> {
        let record = Record::from_parts(key, content, self.inner.stamper.stamp());

        self.inner.local.put(record.clone()).await.map_err(|err| {
            tracing::warn!(key = %record.key(), "Local write failed: {}", err);
            Error::LocalWriteFailed(err)
        })?;

        Ok(record)
    }

    /// Delete the local copy of a note. Returns whether one existed.
    ///
    /// The remote copy is untouched.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.inner
            .local
            .delete(key)
            .await
            .map_err(Error::LocalWriteFailed)
    }

    /// Whether a local copy of the note exists.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.inner
            .local
            .exists(key)
            .await
            .map_err(Error::LocalReadFailed)
    }

    /// All locally stored notes, ordered by key.
    pub async fn all_local(&self) -> Result<Vec<Record>> {
        self.inner.local.all().await.map_err(Error::LocalReadFailed)
    }

    /// Keys that currently have at least one observer, sorted.
    pub fn active_keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self
            .inner
            .channels
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of live observers of `key`.
    pub fn observer_count(&self, key: &str) -> usize {
        self.inner
            .channels
            .get(key)
            .map(|channel| channel.observers)
            .unwrap_or(0)
    }

    /// Merge counters for an observed key.
    pub fn stats(&self, key: &str) -> Option<MergeStats> {
        self.inner
            .channels
            .get(key)
            .map(|channel| *channel.stats.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Remote fetches issued for an observed key.
    pub fn fetch_count(&self, key: &str) -> Option<u64> {
        self.inner
            .channels
            .get(key)
            .map(|channel| channel.poller.fetch_count())
    }

    /// Status events for every key.
    pub fn status(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.status.subscribe()
    }
}

/// A live, merged view of one key.
///
/// Each delivered record has a strictly greater `updated_at` than the one
/// before it. Values are conflated: a slow reader sees the newest value,
/// not every intermediate one.
pub struct Subscription {
    inner: Arc<Inner>,
    key: Key,
    merged: watch::Receiver<Option<Record>>,
    status: broadcast::Receiver<StatusEvent>,
    released: bool,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The merged value right now, if any has been published.
    pub fn current(&self) -> Option<Record> {
        if self.released {
            return None;
        }
        self.merged.borrow().clone()
    }

    /// Wait for the next merged value.
    ///
    /// The first call yields the current value if one exists. Returns `None`
    /// once the subscription is released.
    pub async fn next(&mut self) -> Option<Record> {
        loop {
            if self.released || self.merged.changed().await.is_err() {
                return None;
            }
            if let Some(record) = self.merged.borrow_and_update().clone() {
                return Some(record);
            }
        }
    }

    /// Wait for the next status event for this key.
    pub async fn next_status(&mut self) -> Option<SyncStatus> {
        while !self.released {
            match self.status.recv().await {
                Ok(event) if event.key == self.key => return Some(event.status),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(key = %self.key, skipped, "Status receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
        None
    }

    /// Stop observing. Idempotent.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.release_key(&self.key);
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Consume the subscription as a stream of merged records.
    pub fn into_stream(self) -> impl Stream<Item = Record> + Send {
        stream::unfold(self, |mut subscription| async move {
            let record = subscription.next().await?;
            Some((record, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("released", &self.released)
            .finish()
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.inner.config)
            .field("active_keys", &self.inner.channels.len())
            .finish()
    }
}
