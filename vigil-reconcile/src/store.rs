//! Collaborator interfaces of the reconciler.
//!
//! The reconciler only reads a heartbeat, writes a heartbeat, enumerates the
//! source of truth, and upserts into the cache. It has no other way to reach
//! the outside world, so a pass cannot emit notifications.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

/// Attribute stored for members that report none.
pub const DEFAULT_ATTRIBUTE: &str = "default";

/// Identity of a tracked collection (e.g. one guild).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub String);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CollectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CollectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identity of a member within a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for MemberId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A member as currently observed in the source of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    pub value: Option<String>,
}

impl Member {
    pub fn new(id: impl Into<MemberId>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: Some(value.into()),
        }
    }

    /// Member with no observable attribute.
    pub fn bare(id: impl Into<MemberId>) -> Self {
        Self {
            id: id.into(),
            value: None,
        }
    }

    /// The attribute to cache; empty or missing values become
    /// [`DEFAULT_ATTRIBUTE`].
    pub fn attribute(&self) -> &str {
        match self.value.as_deref() {
            Some(v) if !v.is_empty() => v,
            _ => DEFAULT_ATTRIBUTE,
        }
    }
}

/// A cached member representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMember {
    pub value: String,
    pub observed_at: DateTime<Utc>,
}

/// Outcome of one cache upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upsert {
    /// Value cached before the call, if any.
    pub previous: Option<String>,
    /// Whether the cache was modified.
    pub changed: bool,
}

/// Persisted last-seen timestamp.
pub trait HeartbeatStore {
    /// `Ok(None)` when no heartbeat was ever written.
    fn last_heartbeat(&self) -> Result<Option<DateTime<Utc>>, ReconcileError>;

    fn set_heartbeat(&mut self, at: DateTime<Utc>) -> Result<(), ReconcileError>;
}

/// Cache of per-member observed attributes.
///
/// `upsert` is replace-if-different: when the cached value already equals
/// `value`, nothing (not even `observed_at`) changes and `changed` is false.
pub trait CacheSink {
    fn upsert(
        &mut self,
        collection: &CollectionId,
        member: &MemberId,
        value: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<Upsert, ReconcileError>;

    /// Persist buffered upserts. Stores that write through need not override.
    fn flush(&mut self) -> Result<(), ReconcileError> {
        Ok(())
    }
}

/// Enumerates what currently exists.
pub trait SourceOfTruth {
    fn list_collections(&self) -> Result<Vec<CollectionId>, ReconcileError>;

    /// Fails per collection; the reconciler moves on to the next one.
    fn list_members(&self, collection: &CollectionId) -> Result<Vec<Member>, ReconcileError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_empty_attribute_uses_default() {
        assert_eq!(Member::bare("u1").attribute(), "default");
        assert_eq!(Member::new("u1", "").attribute(), "default");
        assert_eq!(Member::new("u1", "a1b2").attribute(), "a1b2");
    }
}
