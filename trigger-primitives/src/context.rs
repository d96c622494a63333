//! Immutable context built for every dispatch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Priority, TriggerId, TriggerType};

/// Free-form metadata attached to a trigger.
pub type Metadata = Map<String, Value>;

/// Context provided to trigger handlers.
///
/// A context is created fresh for each dispatch and exposes read-only
/// accessors; nothing mutates it after construction.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerContext {
    id: TriggerId,
    timestamp: DateTime<Utc>,
    priority: Priority,
    trigger_type: TriggerType,
    metadata: Metadata,
}

impl TriggerContext {
    /// Builds a context stamped with the current time.
    #[must_use]
    pub fn new(trigger_type: TriggerType, priority: Priority, metadata: Metadata) -> Self {
        Self {
            id: TriggerId::random(),
            timestamp: Utc::now(),
            priority,
            trigger_type,
            metadata,
        }
    }

    /// Returns the dispatch identifier.
    #[must_use]
    pub const fn id(&self) -> TriggerId {
        self.id
    }

    /// Returns the time the context was created.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the trigger priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the trigger type.
    #[must_use]
    pub const fn trigger_type(&self) -> TriggerType {
        self.trigger_type
    }

    /// Returns the caller-supplied metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Renders the timestamp as RFC 3339 with millisecond precision.
    #[must_use]
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}
