//! Resilient execution of a single unit of work.
//!
//! A [`Task`] is run by the [`ResilientExecutor`] under an
//! [`ExecutionPolicy`]: inline on the caller's task or offloaded onto a
//! bounded [`WorkerPool`], each attempt optionally bounded by a timeout, and
//! failed attempts retried immediately until the retry budget is spent.

#![warn(missing_docs, clippy::pedantic)]

mod executor;
mod invocation;
mod policy;
mod pool;
mod task;

pub use executor::{AttemptError, ExecutionError, ExecutionResult, ResilientExecutor};
pub use invocation::{Invocation, InvocationEvent, InvocationState, TransitionError};
pub use policy::{ExecutionMode, ExecutionPolicy};
pub use pool::{PoolConfig, PoolError, PoolResult, WorkerPool};
pub use task::{Attempt, Task, TaskError, TaskFuture, TaskResult};
