//! Trigger routing.
//!
//! A [`TriggerDispatcher`] holds handlers in registration order and hands each
//! trigger to the first one whose capability matches. Handlers registered with
//! an [`ExecutionPolicy`](trigger_executor::ExecutionPolicy) run through the
//! resilient executor; the rest are awaited directly.

#![warn(missing_docs, clippy::pedantic)]

mod builtin;
mod dispatcher;
mod handler;

pub use builtin::BuiltinHandler;
pub use dispatcher::{DispatchError, DispatchResult, DispatcherBuilder, TriggerDispatcher};
pub use handler::{HandlerError, HandlerResult, TriggerHandler};
