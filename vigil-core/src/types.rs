//! Domain types for the service lifecycle.
//!
//! Identity, ordering metadata, and run state. Behaviour lives in
//! [`crate::service`]; these types are plain data and serialize via serde so
//! the daemon can expose them over its control socket.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed identity for a managed service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub String);

impl ServiceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServiceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServiceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// What kind of work a service does. Informational only; ordering never
/// depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    Monitoring,
    Moderation,
    Maintenance,
    Control,
    #[default]
    Custom,
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceCategory::Monitoring => write!(f, "monitoring"),
            ServiceCategory::Moderation => write!(f, "moderation"),
            ServiceCategory::Maintenance => write!(f, "maintenance"),
            ServiceCategory::Control => write!(f, "control"),
            ServiceCategory::Custom => write!(f, "custom"),
        }
    }
}

/// Start priority, used only to break ties between services that have no
/// dependency relation to each other.
///
/// The derived `Ord` follows declaration order, so `High < Normal < Low`
/// and sorting ascending puts high priority first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Run state of a registered service.
///
/// ```text
/// Registered ─▶ Starting ─▶ Running ─▶ Stopping ─▶ Stopped
///                  │                      │
///                  └────────▶ Failed ◀────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    #[default]
    Registered,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Registered => write!(f, "registered"),
            ServiceState::Starting => write!(f, "starting"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::Stopping => write!(f, "stopping"),
            ServiceState::Stopped => write!(f, "stopped"),
            ServiceState::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(ServiceId::from("monitoring").to_string(), "monitoring");
        assert_eq!(ServiceId::from(String::from("x")), ServiceId::from("x"));
    }

    #[test]
    fn priority_orders_high_first() {
        let mut ps = vec![Priority::Low, Priority::High, Priority::Normal];
        ps.sort();
        assert_eq!(ps, vec![Priority::High, Priority::Normal, Priority::Low]);
    }

    #[test]
    fn enums_use_lowercase_yaml() {
        let yaml = serde_yaml::to_string(&Priority::High).expect("serialize");
        assert_eq!(yaml.trim(), "high");
        let cat: ServiceCategory = serde_yaml::from_str("moderation").expect("deserialize");
        assert_eq!(cat, ServiceCategory::Moderation);
        assert_eq!(ServiceState::Stopping.to_string(), "stopping");
    }
}
