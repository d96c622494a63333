//! Trigger dispatch and resilient execution runtime facade.
//!
//! Bundles the workspace crates and wires them together in
//! [`TriggerRuntime`], built from a [`RuntimeConfig`](config::RuntimeConfig).

#![warn(missing_docs, clippy::pedantic)]

mod runtime;

pub use runtime::{RuntimeError, RuntimeResult, TriggerRuntime};

/// Re-export shared primitives for convenience.
pub use trigger_primitives as primitives;

/// Policy-governed execution.
pub use trigger_executor as executor;

/// Trigger routing.
pub use trigger_dispatch as dispatch;

/// Tool registration and invocation.
pub use trigger_tools as tools;

/// Configuration management.
pub use trigger_config as config;

/// Subscriber setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use trigger_telemetry as telemetry;
