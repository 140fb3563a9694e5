//! Downtime classification from the persisted heartbeat.
//!
//! Classification precedence:
//! 1. `Unknown` (heartbeat could not be read)
//! 2. `NeverSeen` (no heartbeat persisted)
//! 3. `Stale` (offline for longer than the threshold)
//! 4. `Recent`
//!
//! A heartbeat in the future (clock moved backwards) counts as zero downtime.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// How long the process appears to have been offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Downtime {
    NeverSeen,
    Stale {
        last_seen: DateTime<Utc>,
        offline: Duration,
    },
    Recent {
        last_seen: DateTime<Utc>,
        offline: Duration,
    },
    Unknown {
        reason: String,
    },
}

impl Downtime {
    /// Whether the silent resync pass must run.
    ///
    /// A missing heartbeat counts as stale. An unreadable one does not: the
    /// downtime cannot be estimated, so the pass is skipped.
    pub fn requires_resync(&self) -> bool {
        matches!(self, Downtime::NeverSeen | Downtime::Stale { .. })
    }

    pub fn offline(&self) -> Option<Duration> {
        match self {
            Downtime::Stale { offline, .. } | Downtime::Recent { offline, .. } => Some(*offline),
            Downtime::NeverSeen | Downtime::Unknown { .. } => None,
        }
    }

    /// Short human label, e.g. `stale (offline 45m)`.
    pub fn describe(&self) -> String {
        match self {
            Downtime::NeverSeen => "never seen".to_string(),
            Downtime::Stale { offline, .. } => format!("stale (offline {})", format_duration(*offline)),
            Downtime::Recent { offline, .. } => {
                format!("recent (offline {})", format_duration(*offline))
            }
            Downtime::Unknown { reason } => format!("unknown ({reason})"),
        }
    }
}

/// Classify the gap between `last_seen` and `now`.
///
/// Stale means strictly longer than `threshold`.
pub fn classify(now: DateTime<Utc>, last_seen: Option<DateTime<Utc>>, threshold: Duration) -> Downtime {
    let Some(last_seen) = last_seen else {
        return Downtime::NeverSeen;
    };
    let offline = now
        .signed_duration_since(last_seen)
        .to_std()
        .unwrap_or_default();
    if offline > threshold {
        Downtime::Stale { last_seen, offline }
    } else {
        Downtime::Recent { last_seen, offline }
    }
}

/// Compact age, e.g. `45s`, `12m`, `3h`, `2d`.
pub fn format_duration(duration: Duration) -> String {
    format_seconds(duration.as_secs())
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const THIRTY_MIN: Duration = Duration::from_secs(30 * 60);

    #[test]
    fn missing_heartbeat_is_never_seen() {
        let signal = classify(Utc::now(), None, THIRTY_MIN);
        assert_eq!(signal, Downtime::NeverSeen);
        assert!(signal.requires_resync());
    }

    #[rstest]
    #[case(45 * 60, true)]
    #[case(30 * 60 + 1, true)]
    #[case(30 * 60, false)]
    #[case(5, false)]
    fn threshold_is_strict(#[case] offline_secs: i64, #[case] stale: bool) {
        let now = Utc::now();
        let signal = classify(now, Some(now - chrono::Duration::seconds(offline_secs)), THIRTY_MIN);
        assert_eq!(signal.requires_resync(), stale, "got {signal:?}");
        assert_eq!(signal.offline(), Some(Duration::from_secs(offline_secs as u64)));
    }

    #[test]
    fn future_heartbeat_is_recent() {
        let now = Utc::now();
        let signal = classify(now, Some(now + chrono::Duration::hours(2)), THIRTY_MIN);
        assert_eq!(signal.offline(), Some(Duration::ZERO));
        assert!(!signal.requires_resync());
    }

    #[test]
    fn unknown_never_resyncs() {
        let signal = Downtime::Unknown {
            reason: "disk gone".to_string(),
        };
        assert!(!signal.requires_resync());
        assert_eq!(signal.describe(), "unknown (disk gone)");
    }

    #[test]
    fn durations_are_compact() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m");
        assert_eq!(format_duration(Duration::from_secs(45 * 60)), "45m");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 5)), "3h");
        assert_eq!(format_duration(Duration::from_secs(49 * 3600)), "2d");
    }
}
