//! Built-in handlers, one per trigger type.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use trigger_primitives::{TriggerContext, TriggerType};

use crate::handler::{HandlerError, HandlerResult, TriggerHandler};

const SPECIAL_COMMANDS: [&str; 3] = ["/help", "/status", "/clear"];

/// The closed set of handlers shipped with the runtime.
///
/// Each variant claims exactly the trigger type it is named after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinHandler {
    /// Echoes commands and answers `/help`, `/status`, and `/clear`.
    Command,
    /// Acknowledges events.
    Event,
    /// Acknowledges scheduled activations.
    Scheduled,
    /// Evaluates the payload's `condition` field.
    Conditional,
}

impl BuiltinHandler {
    /// Every built-in handler, in default registration order.
    pub const ALL: [Self; 4] = [Self::Command, Self::Event, Self::Scheduled, Self::Conditional];

    /// Returns the built-in responsible for `trigger_type`.
    #[must_use]
    pub const fn for_type(trigger_type: TriggerType) -> Self {
        match trigger_type {
            TriggerType::Command => Self::Command,
            TriggerType::Event => Self::Event,
            TriggerType::Scheduled => Self::Scheduled,
            TriggerType::Conditional => Self::Conditional,
        }
    }

    /// Returns the trigger type this handler claims.
    #[must_use]
    pub const fn trigger_type(self) -> TriggerType {
        match self {
            Self::Command => TriggerType::Command,
            Self::Event => TriggerType::Event,
            Self::Scheduled => TriggerType::Scheduled,
            Self::Conditional => TriggerType::Conditional,
        }
    }
}

#[async_trait]
impl TriggerHandler for BuiltinHandler {
    fn name(&self) -> &str {
        match self {
            Self::Command => "command",
            Self::Event => "event",
            Self::Scheduled => "scheduled",
            Self::Conditional => "conditional",
        }
    }

    fn can_handle(&self, trigger_type: TriggerType) -> bool {
        self.trigger_type() == trigger_type
    }

    async fn handle(&self, ctx: &TriggerContext, payload: Value) -> HandlerResult {
        let response = match self {
            Self::Command => {
                let mut response = envelope("command_response", ctx);
                if let Some(command) = payload.as_str().and_then(|c| c.strip_prefix('/')) {
                    response.insert("result".into(), special_command(command)?);
                }
                response.insert("command".into(), payload);
                response
            }
            Self::Event => {
                let mut response = envelope("event_response", ctx);
                response.insert("event".into(), payload);
                response
            }
            Self::Scheduled => {
                let mut response = envelope("scheduled_response", ctx);
                response.insert("schedule".into(), payload);
                response
            }
            Self::Conditional => {
                let mut response = envelope("conditional_trigger", ctx);
                let met = payload.get("condition").is_some_and(truthy);
                response.insert("condition_met".into(), Value::Bool(met));
                response
            }
        };

        Ok(Value::Object(response))
    }
}

fn envelope(kind: &str, ctx: &TriggerContext) -> Map<String, Value> {
    let mut response = Map::new();
    response.insert("type".into(), Value::from(kind));
    response.insert("priority".into(), Value::from(ctx.priority().as_str()));
    response.insert("timestamp".into(), Value::from(ctx.timestamp_rfc3339()));
    if !ctx.metadata().is_empty() {
        response.insert("metadata".into(), Value::Object(ctx.metadata().clone()));
    }
    response
}

fn special_command(command: &str) -> HandlerResult {
    match command {
        "help" => Ok(json!({ "available_commands": SPECIAL_COMMANDS })),
        "status" => Ok(json!({ "system_status": "operational" })),
        "clear" => Ok(json!({ "cleared": true })),
        other => Err(HandlerError::invalid_payload(format!(
            "unknown special command: /{other}"
        ))),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}
