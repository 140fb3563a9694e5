//! Boot-time silent resynchronization.
//!
//! [`reconcile`] reads the last heartbeat, and when the process was offline
//! for longer than the threshold (or never ran), walks every collection in the
//! source of truth and upserts each member's current attribute into the
//! cache. The pass never fails as a whole: every problem is logged, recorded
//! in the [`ReconcileReport`], and skipped. A fresh heartbeat is written at
//! the end whether or not the pass ran.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::downtime::{classify, Downtime};
use crate::error::ReconcileError;
use crate::store::{CacheSink, CollectionId, HeartbeatStore, MemberId, SourceOfTruth};

/// One skipped step of a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileFailure {
    #[error("reading heartbeat failed: {0}")]
    HeartbeatRead(#[source] ReconcileError),

    #[error("listing collections failed: {0}")]
    ListCollections(#[source] ReconcileError),

    #[error("collection '{collection}' skipped: {source}")]
    Collection {
        collection: CollectionId,
        #[source]
        source: ReconcileError,
    },

    #[error("member '{member}' in '{collection}' skipped: {source}")]
    Member {
        collection: CollectionId,
        member: MemberId,
        #[source]
        source: ReconcileError,
    },

    #[error("flushing cache failed: {0}")]
    Flush(#[source] ReconcileError),

    #[error("writing heartbeat failed: {0}")]
    HeartbeatWrite(#[source] ReconcileError),
}

/// Counts and failures of one pass.
#[derive(Debug)]
pub struct ReconcileReport {
    pub downtime: Downtime,
    /// Whether the member walk ran.
    pub resynced: bool,
    /// Collections whose members were listed successfully.
    pub collections: usize,
    /// Members visited across all collections.
    pub members: usize,
    /// Upserts that modified the cache.
    pub changed: usize,
    /// Upserts that found the cache already current.
    pub unchanged: usize,
    pub failures: Vec<ReconcileFailure>,
    pub heartbeat_written: bool,
}

impl ReconcileReport {
    fn new(downtime: Downtime) -> Self {
        Self {
            downtime,
            resynced: false,
            collections: 0,
            members: 0,
            changed: 0,
            unchanged: 0,
            failures: Vec::new(),
            heartbeat_written: false,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run one reconciliation pass at `now`.
pub fn reconcile<S, H, C>(
    now: DateTime<Utc>,
    stale_threshold: Duration,
    source: &S,
    heartbeats: &mut H,
    cache: &mut C,
) -> ReconcileReport
where
    S: SourceOfTruth + ?Sized,
    H: HeartbeatStore + ?Sized,
    C: CacheSink + ?Sized,
{
    let mut read_failure = None;
    let downtime = match heartbeats.last_heartbeat() {
        Ok(last) => classify(now, last, stale_threshold),
        Err(e) => {
            tracing::warn!(error = %e, "could not read heartbeat; skipping resync");
            let downtime = Downtime::Unknown {
                reason: e.to_string(),
            };
            read_failure = Some(ReconcileFailure::HeartbeatRead(e));
            downtime
        }
    };

    let mut report = ReconcileReport::new(downtime);
    report.failures.extend(read_failure);

    if report.downtime.requires_resync() {
        tracing::info!(downtime = %report.downtime.describe(), "resynchronizing cache");
        report.resynced = true;
        resync(now, source, cache, &mut report);
    } else {
        tracing::debug!(downtime = %report.downtime.describe(), "cache is current");
    }

    match heartbeats.set_heartbeat(now) {
        Ok(()) => report.heartbeat_written = true,
        Err(e) => {
            tracing::warn!(error = %e, "could not write heartbeat");
            report.failures.push(ReconcileFailure::HeartbeatWrite(e));
        }
    }

    tracing::info!(
        resynced = report.resynced,
        collections = report.collections,
        members = report.members,
        changed = report.changed,
        failures = report.failures.len(),
        "reconciliation finished"
    );
    report
}

fn resync<S, C>(now: DateTime<Utc>, source: &S, cache: &mut C, report: &mut ReconcileReport)
where
    S: SourceOfTruth + ?Sized,
    C: CacheSink + ?Sized,
{
    let collections = match source.list_collections() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "could not list collections");
            report.failures.push(ReconcileFailure::ListCollections(e));
            return;
        }
    };

    for collection in collections {
        let members = match source.list_members(&collection) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(collection = %collection, error = %e, "skipping collection");
                report
                    .failures
                    .push(ReconcileFailure::Collection { collection, source: e });
                continue;
            }
        };
        report.collections += 1;

        for member in members {
            report.members += 1;
            if member.id.0.is_empty() {
                tracing::warn!(collection = %collection, "skipping member with empty id");
                report.failures.push(ReconcileFailure::Member {
                    collection: collection.clone(),
                    member: member.id,
                    source: ReconcileError::Source("member id is empty".to_string()),
                });
                continue;
            }
            match cache.upsert(&collection, &member.id, member.attribute(), now) {
                Ok(outcome) if outcome.changed => {
                    tracing::debug!(
                        collection = %collection,
                        member = %member.id,
                        previous = ?outcome.previous,
                        "cache entry updated"
                    );
                    report.changed += 1;
                }
                Ok(_) => report.unchanged += 1,
                Err(e) => {
                    tracing::warn!(
                        collection = %collection,
                        member = %member.id,
                        error = %e,
                        "skipping member"
                    );
                    report.failures.push(ReconcileFailure::Member {
                        collection: collection.clone(),
                        member: member.id,
                        source: e,
                    });
                }
            }
        }
    }

    if let Err(e) = cache.flush() {
        tracing::warn!(error = %e, "could not flush cache");
        report.failures.push(ReconcileFailure::Flush(e));
    }
}
