//! Last-write-wins merge policy.
//!
//! This is the deterministic heart of the engine. Given the last merged
//! record for a key and an incoming record from either source, it decides
//! whether the incoming record becomes the new merged value.
//!
//! # Algorithm
//!
//! 1. No merged value yet: accept
//! 2. Incoming timestamp strictly greater: accept
//! 3. Same timestamp and same content: duplicate, discard
//! 4. Same timestamp, different content: the tie policy decides
//! 5. Older: discard
//!
//! Nothing here performs IO; the engine and the note server both drive it.

use crate::{record::Origin, Record};
use serde::{Deserialize, Serialize};

/// How equal-timestamp conflicts are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePolicy {
    /// Keep the existing value on a timestamp tie (default). When false, a
    /// remote record with the same timestamp but different content replaces
    /// the existing value.
    pub local_bias_on_tie: bool,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            local_bias_on_tie: true,
        }
    }
}

/// Outcome of offering one record to the merge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeDecision {
    /// First value seen for the key
    Initial,
    /// Strictly newer than the merged value
    Newer,
    /// Equal timestamp, different content, taken because ties favor remote
    TieAccepted,
    /// Same timestamp and content as the merged value
    Duplicate,
    /// Equal timestamp, different content, existing value kept
    TieRejected,
    /// Older than the merged value
    Stale,
    /// Record belongs to another key
    ForeignKey,
}

impl MergeDecision {
    /// Whether the incoming record replaced the merged value.
    pub fn is_accepted(self) -> bool {
        matches!(
            self,
            MergeDecision::Initial | MergeDecision::Newer | MergeDecision::TieAccepted
        )
    }
}

/// Decide how `incoming` relates to `existing` without mutating anything.
pub fn resolve(
    existing: Option<&Record>,
    incoming: &Record,
    origin: Origin,
    policy: MergePolicy,
) -> MergeDecision {
    let Some(existing) = existing else {
        return MergeDecision::Initial;
    };

    if existing.key() != incoming.key() {
        return MergeDecision::ForeignKey;
    }

    if incoming.supersedes(existing) {
        MergeDecision::Newer
    } else if incoming.same_version(existing) {
        MergeDecision::Duplicate
    } else if incoming.updated_at() == existing.updated_at() {
        if !policy.local_bias_on_tie && origin == Origin::Remote {
            MergeDecision::TieAccepted
        } else {
            MergeDecision::TieRejected
        }
    } else {
        MergeDecision::Stale
    }
}

/// Counters kept by a [`MergeState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    pub accepted_local: u64,
    pub accepted_remote: u64,
    pub discarded: u64,
}

/// The last-known-best record for one key.
#[derive(Debug, Clone, Default)]
pub struct MergeState {
    policy: MergePolicy,
    current: Option<Record>,
    stats: MergeStats,
}

impl MergeState {
    /// Create an empty merge state.
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            current: None,
            stats: MergeStats::default(),
        }
    }

    /// Offer an incoming record. Accepted records become the merged value.
    pub fn offer(&mut self, incoming: Record, origin: Origin) -> MergeDecision {
        let decision = resolve(self.current.as_ref(), &incoming, origin, self.policy);

        if decision.is_accepted() {
            match origin {
                Origin::Local => self.stats.accepted_local += 1,
                Origin::Remote => self.stats.accepted_remote += 1,
            }
            self.current = Some(incoming);
        } else {
            self.stats.discarded += 1;
        }

        decision
    }

    /// The merged value, if any.
    pub fn current(&self) -> Option<&Record> {
        self.current.as_ref()
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }
}
