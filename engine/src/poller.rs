//! Periodic remote fetching for one key.
//!
//! A [`Poller`] owns exactly one background task. The task fetches right away
//! and then once per period, handing each outcome to a callback. Fetches never
//! overlap: a tick that comes due while a fetch is still running is skipped.
//!
//! Stopping is synchronous from the caller's side. Results are delivered
//! through a gate that [`Poller::stop`] closes under the same lock, so once
//! `stop` returns the callback cannot run again.

use crate::error::RemoteError;
use crate::{Key, Record, RemoteClient};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Outcome of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// The remote returned a record
    Fetched(Record),
    /// The remote has no record for the key
    NotFound,
    /// Transient failure; polling continues
    Failed(RemoteError),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct Gate {
    closed: Mutex<bool>,
}

impl Gate {
    /// Run `deliver` unless the gate is closed. Returns false once closed.
    fn pass(&self, deliver: impl FnOnce()) -> bool {
        let closed = lock(&self.closed);
        if *closed {
            return false;
        }
        deliver();
        true
    }

    fn close(&self) {
        *lock(&self.closed) = true;
    }

    fn is_closed(&self) -> bool {
        *lock(&self.closed)
    }
}

/// Handle to a running poll loop for one key.
#[derive(Debug)]
pub struct Poller {
    key: Key,
    gate: Arc<Gate>,
    task: Mutex<Option<JoinHandle<()>>>,
    fetches: Arc<AtomicU64>,
}

impl Poller {
    /// Start polling `key` every `period`. The first fetch is issued immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<F>(
        key: impl Into<Key>,
        period: Duration,
        fetch_timeout: Duration,
        remote: Arc<dyn RemoteClient>,
        on_result: F,
    ) -> Self
    where
        F: Fn(PollResult) + Send + Sync + 'static,
    {
        let key = key.into();
        let gate = Arc::new(Gate::default());
        let fetches = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(poll_loop(
            key.clone(),
            period.max(Duration::from_millis(1)),
            fetch_timeout,
            remote,
            gate.clone(),
            fetches.clone(),
            on_result,
        ));

        tracing::debug!(key = %key, period_ms = period.as_millis() as u64, "Poller started");

        Self {
            key,
            gate,
            task: Mutex::new(Some(task)),
            fetches,
        }
    }

    /// Stop polling. No callback runs after this returns. Idempotent.
    pub fn stop(&self) {
        self.gate.close();
        if let Some(task) = lock(&self.task).take() {
            task.abort();
            tracing::debug!(key = %self.key, "Poller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.gate.is_closed()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of fetches issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop<F>(
    key: Key,
    period: Duration,
    fetch_timeout: Duration,
    remote: Arc<dyn RemoteClient>,
    gate: Arc<Gate>,
    fetches: Arc<AtomicU64>,
    on_result: F,
) where
    F: Fn(PollResult) + Send + Sync + 'static,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if gate.is_closed() {
            break;
        }

        fetches.fetch_add(1, Ordering::SeqCst);
        let result = match tokio::time::timeout(fetch_timeout, remote.fetch(&key)).await {
            Ok(Ok(record)) => PollResult::Fetched(record),
            Ok(Err(RemoteError::NotFound(_))) => PollResult::NotFound,
            Ok(Err(err)) => PollResult::Failed(err),
            Err(_) => PollResult::Failed(RemoteError::Timeout),
        };

        match &result {
            PollResult::Fetched(record) => {
                tracing::trace!(key = %key, updated_at = record.updated_at(), "Fetched remote note");
            }
            PollResult::NotFound => tracing::trace!(key = %key, "Remote has no note"),
            PollResult::Failed(err) => tracing::warn!(key = %key, "Remote fetch failed: {}", err),
        }

        if !gate.pass(|| on_result(result)) {
            break;
        }
    }
}
