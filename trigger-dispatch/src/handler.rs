//! Handler capability interface.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use trigger_primitives::{TriggerContext, TriggerType};

/// Errors that can occur while handling a trigger.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// The payload was not acceptable to the handler.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// Custom handler error with human-readable context.
    #[error("handler error: {0}")]
    Custom(String),
}

impl HandlerError {
    /// Creates an invalid-payload error.
    #[must_use]
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload(reason.into())
    }

    /// Creates a custom error variant from a string-like value.
    #[must_use]
    pub fn custom(reason: impl Into<String>) -> Self {
        Self::Custom(reason.into())
    }
}

/// Result alias for handler operations.
pub type HandlerResult<T = Value> = Result<T, HandlerError>;

/// A component that claims responsibility for one or more trigger types.
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    /// Name used in logs and configuration errors.
    fn name(&self) -> &str;

    /// Returns `true` if this handler accepts `trigger_type`.
    fn can_handle(&self, trigger_type: TriggerType) -> bool;

    /// Handles a trigger, producing a structured response.
    async fn handle(&self, ctx: &TriggerContext, payload: Value) -> HandlerResult;
}
