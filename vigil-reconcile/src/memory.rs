//! In-memory collaborators for tests and embedding.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::error::ReconcileError;
use crate::store::{
    CacheSink, CachedMember, CollectionId, HeartbeatStore, Member, MemberId, SourceOfTruth, Upsert,
};

/// Heartbeat held in memory, with switches to simulate storage failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryHeartbeat {
    last: Option<DateTime<Utc>>,
    fail_reads: bool,
    fail_writes: bool,
}

impl MemoryHeartbeat {
    pub fn at(last: DateTime<Utc>) -> Self {
        Self {
            last: Some(last),
            ..Self::default()
        }
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// The currently stored heartbeat, bypassing the read switch.
    pub fn written(&self) -> Option<DateTime<Utc>> {
        self.last
    }
}

impl HeartbeatStore for MemoryHeartbeat {
    fn last_heartbeat(&self) -> Result<Option<DateTime<Utc>>, ReconcileError> {
        if self.fail_reads {
            return Err(ReconcileError::Source("heartbeat unavailable".to_string()));
        }
        Ok(self.last)
    }

    fn set_heartbeat(&mut self, at: DateTime<Utc>) -> Result<(), ReconcileError> {
        if self.fail_writes {
            return Err(ReconcileError::Source("heartbeat is read-only".to_string()));
        }
        self.last = Some(at);
        Ok(())
    }
}

/// Cache keyed by `(collection, member)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryCache {
    entries: BTreeMap<(CollectionId, MemberId), CachedMember>,
    rejected: BTreeSet<MemberId>,
}

impl MemoryCache {
    /// Seed an entry without going through [`CacheSink::upsert`].
    pub fn with_entry(
        mut self,
        collection: impl Into<CollectionId>,
        member: impl Into<MemberId>,
        value: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        self.entries.insert(
            (collection.into(), member.into()),
            CachedMember {
                value: value.into(),
                observed_at,
            },
        );
        self
    }

    /// Make every upsert for `member` fail.
    pub fn rejecting(mut self, member: impl Into<MemberId>) -> Self {
        self.rejected.insert(member.into());
        self
    }

    pub fn get(&self, collection: &str, member: &str) -> Option<&CachedMember> {
        self.entries
            .get(&(CollectionId::from(collection), MemberId::from(member)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheSink for MemoryCache {
    fn upsert(
        &mut self,
        collection: &CollectionId,
        member: &MemberId,
        value: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<Upsert, ReconcileError> {
        if self.rejected.contains(member) {
            return Err(ReconcileError::Source(format!("cache rejected '{member}'")));
        }
        let key = (collection.clone(), member.clone());
        let previous = self.entries.get(&key).map(|c| c.value.clone());
        if previous.as_deref() == Some(value) {
            return Ok(Upsert {
                previous,
                changed: false,
            });
        }
        self.entries.insert(
            key,
            CachedMember {
                value: value.to_string(),
                observed_at,
            },
        );
        Ok(Upsert {
            previous,
            changed: true,
        })
    }
}

/// Source of truth held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    collections: BTreeMap<CollectionId, Vec<Member>>,
    unavailable: BTreeSet<CollectionId>,
    fail_listing: bool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, id: impl Into<CollectionId>, members: Vec<Member>) -> Self {
        self.collections.insert(id.into(), members);
        self
    }

    /// A collection that is listed but whose members cannot be fetched.
    pub fn with_unavailable(mut self, id: impl Into<CollectionId>) -> Self {
        self.unavailable.insert(id.into());
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }
}

impl SourceOfTruth for MemorySource {
    fn list_collections(&self) -> Result<Vec<CollectionId>, ReconcileError> {
        if self.fail_listing {
            return Err(ReconcileError::Source("collections unavailable".to_string()));
        }
        let ids: BTreeSet<&CollectionId> = self
            .collections
            .keys()
            .chain(self.unavailable.iter())
            .collect();
        Ok(ids.into_iter().cloned().collect())
    }

    fn list_members(&self, collection: &CollectionId) -> Result<Vec<Member>, ReconcileError> {
        if self.unavailable.contains(collection) {
            return Err(ReconcileError::Source(format!(
                "members of '{collection}' unavailable"
            )));
        }
        Ok(self.collections.get(collection).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_only_when_different() {
        let first = Utc::now();
        let later = first + chrono::Duration::minutes(5);
        let mut cache = MemoryCache::default();
        let g = CollectionId::from("g1");
        let u = MemberId::from("u1");

        let created = cache.upsert(&g, &u, "a", first).unwrap();
        assert_eq!(created, Upsert { previous: None, changed: true });

        let same = cache.upsert(&g, &u, "a", later).unwrap();
        assert!(!same.changed);
        assert_eq!(cache.get("g1", "u1").unwrap().observed_at, first);

        let replaced = cache.upsert(&g, &u, "b", later).unwrap();
        assert_eq!(replaced.previous.as_deref(), Some("a"));
        assert_eq!(cache.get("g1", "u1").unwrap().value, "b");
    }

    #[test]
    fn unavailable_collections_are_still_listed() {
        let source = MemorySource::new()
            .with_collection("b", vec![])
            .with_unavailable("a");
        let ids = source.list_collections().unwrap();
        assert_eq!(ids, vec![CollectionId::from("a"), CollectionId::from("b")]);
        assert!(source.list_members(&"a".into()).is_err());
    }
}
