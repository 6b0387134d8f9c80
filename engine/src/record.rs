//! Record types flowing through the sync engine.

use crate::{Key, Timestamp};
use serde::{Deserialize, Serialize};

/// Origin of an event arriving at the merge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Delivered by the local store's change stream
    Local,
    /// Fetched from the remote store by a poller
    Remote,
}

/// A synchronized note.
///
/// Records are immutable values: a newer version of a note is a new `Record`
/// with the same key and a larger `updated_at`. Only the engine's write path
/// assigns timestamps, so there is no public way to build a record with an
/// arbitrary timestamp outside of [`Record::from_parts`], which exists for
/// store and transport implementations that rehydrate records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    key: Key,
    content: String,
    updated_at: Timestamp,
}

impl Record {
    /// Rebuild a record that was previously stamped by an engine.
    pub fn from_parts(key: impl Into<Key>, content: impl Into<String>, updated_at: Timestamp) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            updated_at,
        }
    }

    /// The note's identity.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The note body.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Last-modified time in milliseconds since the epoch.
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Whether this record is authoritative over `other` under last-write-wins.
    ///
    /// Only a strictly greater timestamp supersedes; ties keep `other`.
    pub fn supersedes(&self, other: &Record) -> bool {
        self.updated_at > other.updated_at
    }

    /// Whether both records carry the same timestamp and body.
    pub fn same_version(&self, other: &Record) -> bool {
        self.updated_at == other.updated_at && self.content == other.content
    }
}
