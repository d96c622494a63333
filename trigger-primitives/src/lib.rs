//! Core shared types for trigger dispatch.

#![warn(missing_docs, clippy::pedantic)]

mod context;
mod error;
mod ids;
mod trigger;

/// Per-dispatch context handed to trigger handlers.
pub use context::{Metadata, TriggerContext};
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Unique identifier for a single dispatch.
pub use ids::TriggerId;
/// Trigger classification and priority ordinals.
pub use trigger::{Priority, TriggerType};
