//! # NoteSync Engine
//!
//! Keeps keyed text notes consistent between a local store and a remote store
//! that can only be polled, reconciling divergent copies with last-write-wins.
//!
//! ## Design Principles
//!
//! - **Injected IO**: the local store and the remote are traits passed in by
//!   the application; the engine owns neither
//! - **One writer per key**: every merge for a key runs on that key's actor
//! - **Bounded polling**: one poller per observed key, stopped with its last
//!   observer
//! - **Monotonic view**: observers never see a timestamp go backwards
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is a note: key, content, and the millisecond timestamp the
//! engine stamped on it. Records are immutable; a newer version is a new
//! record.
//!
//! ### Merge
//!
//! [`MergeState`] holds the best record seen for a key. An incoming record
//! replaces it only if its timestamp is strictly greater; ties keep the
//! existing value unless [`SyncConfig::local_bias_on_tie`] is off.
//!
//! ### Polling
//!
//! A [`Poller`] fetches one key on a fixed period, never overlapping fetches
//! and never delivering after it is stopped.
//!
//! ### Engine
//!
//! [`SyncEngine`] ties it together: [`SyncEngine::observe`] returns a
//! [`Subscription`] to the merged view, [`SyncEngine::write`] stamps and
//! writes through to both stores.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use notesync_engine::{HttpRemote, MemoryStore, SyncConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = SyncEngine::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(HttpRemote::new("http://localhost:3000")),
//!     SyncConfig::from_env()?,
//! )?;
//!
//! let mut groceries = engine.observe("groceries");
//! engine.write("groceries", "milk, eggs").await?;
//!
//! while let Some(note) = groceries.next().await {
//!     println!("{} @ {}: {}", note.key(), note.updated_at(), note.content());
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod merge;
pub mod poller;
pub mod record;
pub mod remote;
pub mod snapshot;
pub mod store;
pub mod sync;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, Stamper, SystemClock};
pub use config::{ConfigError, SyncConfig};
pub use error::{Error, RemoteError, StoreError};
pub use merge::{resolve, MergeDecision, MergePolicy, MergeState, MergeStats};
pub use poller::{PollResult, Poller};
pub use record::{Origin, Record};
pub use remote::{HttpRemote, RemoteClient};
pub use snapshot::{StoreSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use store::{LocalStore, MemoryStore, RecordStream};
pub use sync::{StatusEvent, Subscription, SyncEngine, SyncStatus};

/// Type aliases for clarity
pub type Key = String;
pub type Timestamp = u64;
