//! Runtime registry for tool metadata, policies, and execution.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use trigger_executor::{
    Attempt, ExecutionError, ExecutionPolicy, ResilientExecutor, Task, TaskError,
};

use crate::priority::PriorityToolRegistry;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Metadata describing a registered tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolMetadata {
    name: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ToolMetadata {
    /// Creates metadata for the supplied identifier and version.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidMetadata`] if either field is empty.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> ToolResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ToolError::InvalidMetadata {
                reason: "tool name cannot be empty".into(),
            });
        }

        let version = version.into();
        if version.trim().is_empty() {
            return Err(ToolError::InvalidMetadata {
                reason: "tool version cannot be empty".into(),
            });
        }

        Ok(Self {
            name,
            version,
            description: None,
        })
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the semantic version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Async tool implementation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes the tool with the given JSON input, returning JSON output.
    async fn invoke(&self, input: Value) -> ToolResult<Value>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(Value) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn invoke(&self, input: Value) -> ToolResult<Value> {
        (self)(input).await
    }
}

/// Synchronous tool implementation that may block.
///
/// The [`Attempt`] exposes a cancellation token the tool should poll so that
/// it stops once its attempt times out.
pub trait BlockingTool: Send + Sync {
    /// Invokes the tool with the given JSON input, returning JSON output.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Execution`] when the tool fails.
    fn invoke(&self, input: Value, attempt: &Attempt) -> ToolResult<Value>;
}

impl<F> BlockingTool for F
where
    F: Send + Sync + Fn(Value, &Attempt) -> ToolResult<Value>,
{
    fn invoke(&self, input: Value, attempt: &Attempt) -> ToolResult<Value> {
        (self)(input, attempt)
    }
}

#[derive(Clone)]
enum ToolBody {
    Async(Arc<dyn Tool>),
    Blocking(Arc<dyn BlockingTool>),
}

#[derive(Clone)]
struct ToolHandle {
    metadata: ToolMetadata,
    policy: ExecutionPolicy,
    body: ToolBody,
}

impl ToolHandle {
    fn task(&self, input: Value) -> Task<Value> {
        match &self.body {
            ToolBody::Async(tool) => {
                let tool = Arc::clone(tool);
                Task::from_async(move |_attempt| {
                    let tool = Arc::clone(&tool);
                    let input = input.clone();
                    async move { Tool::invoke(tool.as_ref(), input).await.map_err(to_task_error) }
                })
            }
            ToolBody::Blocking(tool) => {
                let tool = Arc::clone(tool);
                Task::blocking(move |attempt| {
                    BlockingTool::invoke(tool.as_ref(), input.clone(), &attempt)
                        .map_err(to_task_error)
                })
            }
        }
    }
}

fn to_task_error(err: ToolError) -> TaskError {
    TaskError::from_source(err)
}

/// Registry that stores tool implementations keyed by name.
///
/// Every tool carries the [`ExecutionPolicy`] it was registered with; its
/// priority is mirrored into the registry's [`PriorityToolRegistry`].
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<HashMap<String, ToolHandle>>,
    priorities: PriorityToolRegistry,
    executor: ResilientExecutor,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("tool registry poisoned");
        let names: Vec<_> = inner.keys().cloned().collect();
        f.debug_struct("ToolRegistry")
            .field("registered", &names)
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    /// Creates an empty registry with a default executor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry that runs tools on `executor`.
    #[must_use]
    pub fn with_executor(executor: ResilientExecutor) -> Self {
        Self {
            executor,
            ..Self::default()
        }
    }

    /// Returns the priority table mirrored from registrations.
    #[must_use]
    pub fn priorities(&self) -> &PriorityToolRegistry {
        &self.priorities
    }

    /// Registers an async tool under `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is already present.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn register_tool<T>(
        &self,
        metadata: ToolMetadata,
        policy: ExecutionPolicy,
        tool: T,
    ) -> ToolResult<()>
    where
        T: Tool + 'static,
    {
        self.insert(metadata, policy, ToolBody::Async(Arc::new(tool)))
    }

    /// Registers a blocking tool under `policy`.
    ///
    /// Blocking tools should be paired with
    /// [`ExecutionMode::Offloaded`](trigger_executor::ExecutionMode::Offloaded)
    /// so they run on the worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is already present.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn register_blocking_tool<T>(
        &self,
        metadata: ToolMetadata,
        policy: ExecutionPolicy,
        tool: T,
    ) -> ToolResult<()>
    where
        T: BlockingTool + 'static,
    {
        self.insert(metadata, policy, ToolBody::Blocking(Arc::new(tool)))
    }

    fn insert(
        &self,
        metadata: ToolMetadata,
        policy: ExecutionPolicy,
        body: ToolBody,
    ) -> ToolResult<()> {
        let mut inner = self.inner.write().expect("tool registry poisoned");
        let name = metadata.name().to_owned();
        if inner.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }

        self.priorities.register(name.clone(), policy.priority());
        inner.insert(
            name,
            ToolHandle {
                metadata,
                policy,
                body,
            },
        );

        Ok(())
    }

    /// Returns the policy bound to `name`.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn policy(&self, name: &str) -> Option<ExecutionPolicy> {
        self.handle(name).map(|handle| handle.policy)
    }

    fn handle(&self, name: &str) -> Option<ToolHandle> {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner.get(name).cloned()
    }

    /// Invokes a registered tool under its bound policy.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when the tool is not found or
    /// [`ToolError::Invocation`] when every permitted attempt fails.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub async fn invoke(&self, name: &str, input: Value) -> ToolResult<Value> {
        let handle = self.handle(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_owned(),
        })?;

        info!(
            tool = name,
            priority = self.priorities.priority_of(name),
            mode = ?handle.policy.mode(),
            "invoking tool"
        );

        let task = handle.task(input);
        self.executor
            .execute(&task, &handle.policy)
            .await
            .map_err(|source| ToolError::Invocation {
                name: name.to_owned(),
                source,
            })
    }

    /// Lists the metadata of all registered tools, highest priority first.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn list(&self) -> Vec<ToolMetadata> {
        let inner = self.inner.read().expect("tool registry poisoned");
        self.priorities
            .ranked()
            .into_iter()
            .filter_map(|(name, _)| inner.get(&name).map(|handle| handle.metadata.clone()))
            .collect()
    }
}

/// Errors produced by tool registration and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool metadata failed validation.
    #[error("invalid tool metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },

    /// Tool body failed.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },

    /// Every attempt permitted by the tool's policy failed.
    #[error("tool `{name}` failed: {source}")]
    Invocation {
        /// Name of the failing tool.
        name: String,
        /// Executor error carrying the last attempt's failure.
        #[source]
        source: ExecutionError,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }
}
