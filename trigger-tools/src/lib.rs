//! Tool registration and policy-bound invocation.
//!
//! Tools are registered by name together with the [`ExecutionPolicy`] they
//! run under. Their priorities are mirrored into a [`PriorityToolRegistry`]
//! for logging and ranking; priority never changes how a tool is executed.
//!
//! [`ExecutionPolicy`]: trigger_executor::ExecutionPolicy

#![warn(missing_docs, clippy::pedantic)]

pub mod priority;
pub mod registry;

pub use priority::PriorityToolRegistry;
pub use registry::{BlockingTool, Tool, ToolError, ToolMetadata, ToolRegistry, ToolResult};
