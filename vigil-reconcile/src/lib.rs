//! # vigil-reconcile
//!
//! Downtime-aware cache resynchronization.
//!
//! At boot, [`reconcile`] compares the persisted heartbeat against a staleness
//! threshold and, if the process was away long enough to miss updates, brings
//! the member cache back in line with the source of truth. The collaborators
//! are traits ([`HeartbeatStore`], [`CacheSink`], [`SourceOfTruth`]) with
//! file-backed ([`FileStore`], [`DirectorySource`]) and in-memory
//! implementations.

pub mod downtime;
pub mod error;
pub mod file_store;
pub mod fs_source;
pub mod memory;
pub mod reconciler;
pub mod store;

pub use downtime::{classify, Downtime};
pub use error::ReconcileError;
pub use file_store::{CacheDir, CacheFile, FileStore, HeartbeatFile};
pub use fs_source::DirectorySource;
pub use memory::{MemoryCache, MemoryHeartbeat, MemorySource};
pub use reconciler::{reconcile, ReconcileFailure, ReconcileReport};
pub use store::{
    CacheSink, CachedMember, CollectionId, HeartbeatStore, Member, MemberId, SourceOfTruth, Upsert,
    DEFAULT_ATTRIBUTE,
};
