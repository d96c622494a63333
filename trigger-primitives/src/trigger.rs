//! Trigger classification and priority ordinals.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Kind of trigger submitted for handling.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    /// Explicit command issued by a caller.
    Command,
    /// Notification that something happened.
    Event,
    /// Time-based activation.
    Scheduled,
    /// Activation guarded by a condition carried in the payload.
    Conditional,
}

impl TriggerType {
    /// Every trigger type, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Command,
        Self::Event,
        Self::Scheduled,
        Self::Conditional,
    ];

    /// Returns the canonical uppercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "COMMAND",
            Self::Event => "EVENT",
            Self::Scheduled => "SCHEDULED",
            Self::Conditional => "CONDITIONAL",
        }
    }
}

impl Display for TriggerType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownTriggerType { value: s.into() })
    }
}

/// Ordinal priority attached to a trigger.
///
/// Priorities are totally ordered `Low < Medium < High < Critical`. They are
/// carried for observability and never reorder work.
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Background work.
    #[default]
    Low,
    /// Normal work.
    Medium,
    /// Work that should be looked at first.
    High,
    /// Work that must not wait.
    Critical,
}

impl Priority {
    /// Every priority, lowest first.
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Returns the canonical uppercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownPriority { value: s.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_are_ordered() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Critical);
        assert_eq!(Priority::ALL.iter().max(), Some(&Priority::Critical));
    }

    #[test]
    fn parsing_ignores_case() {
        assert_eq!("command".parse::<TriggerType>().unwrap(), TriggerType::Command);
        assert_eq!(" Scheduled ".parse::<TriggerType>().unwrap(), TriggerType::Scheduled);
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
    }

    #[test]
    fn unknown_names_error() {
        let err = "webhook".parse::<TriggerType>().expect_err("unknown type");
        assert!(matches!(err, Error::UnknownTriggerType { value } if value == "webhook"));

        let err = "urgent".parse::<Priority>().expect_err("unknown priority");
        assert!(matches!(err, Error::UnknownPriority { .. }));
    }

    #[test]
    fn serialises_as_uppercase_names() {
        let json = serde_json::to_value((TriggerType::Conditional, Priority::Critical)).unwrap();
        assert_eq!(json, serde_json::json!(["CONDITIONAL", "CRITICAL"]));

        let parsed: TriggerType = serde_json::from_str("\"EVENT\"").unwrap();
        assert_eq!(parsed, TriggerType::Event);
    }
}
