//! Shared error definitions for trigger primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the trigger runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing trigger primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided trigger identifier could not be parsed.
    #[error("invalid trigger id: {source}")]
    InvalidTriggerId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// The provided string does not name a trigger type.
    #[error("unknown trigger type `{value}`")]
    UnknownTriggerType {
        /// The offending input.
        value: String,
    },

    /// The provided string does not name a priority.
    #[error("unknown priority `{value}`")]
    UnknownPriority {
        /// The offending input.
        value: String,
    },
}
