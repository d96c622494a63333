//! Runtime assembly from configuration.

use serde_json::Value;
use thiserror::Error;
use tracing::info;
use trigger_config::{ConfigError, RuntimeConfig};
use trigger_dispatch::{BuiltinHandler, DispatchError, DispatchResult, TriggerDispatcher};
use trigger_executor::{ExecutionPolicy, ExecutionResult, ResilientExecutor, Task, WorkerPool};
use trigger_primitives::{Metadata, Priority, TriggerType};
use trigger_tools::{ToolRegistry, ToolResult};

/// Errors produced while assembling the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The dispatcher could not be built.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Result alias for runtime assembly.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Dispatcher, tool registry, and executor sharing one worker pool.
#[derive(Debug)]
pub struct TriggerRuntime {
    config: RuntimeConfig,
    executor: ResilientExecutor,
    dispatcher: TriggerDispatcher,
    tools: ToolRegistry,
}

impl TriggerRuntime {
    /// Builds a runtime with the built-in handlers registered under the
    /// policies named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] for invalid configuration and
    /// [`RuntimeError::Dispatch`] when strict capability checking fails.
    pub fn from_config(config: RuntimeConfig) -> RuntimeResult<Self> {
        config.validate()?;
        let executor = ResilientExecutor::new(WorkerPool::new(config.pool_config()?));

        let mut builder = TriggerDispatcher::builder()
            .with_executor(executor.clone())
            .strict_capabilities(config.strict_capabilities);
        for handler in BuiltinHandler::ALL {
            let policy = config.policy_for(handler.trigger_type())?;
            builder = match policy {
                Some(policy) => builder.register_with_policy(handler, policy),
                None => builder.register(handler),
            };
        }
        let dispatcher = builder.build()?;

        info!(
            workers = config.worker_pool_size,
            handlers = ?dispatcher.handler_names(),
            "trigger runtime ready"
        );

        Ok(Self {
            tools: ToolRegistry::with_executor(executor.clone()),
            config,
            executor,
            dispatcher,
        })
    }

    /// Returns the configuration the runtime was built from.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Returns the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &TriggerDispatcher {
        &self.dispatcher
    }

    /// Returns the tool registry.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Returns the shared executor.
    #[must_use]
    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    /// Dispatches a trigger. See [`TriggerDispatcher::process`].
    ///
    /// # Errors
    ///
    /// Propagates every [`DispatchError`] from the dispatcher.
    pub async fn process(
        &self,
        trigger_type: TriggerType,
        priority: Priority,
        payload: Value,
        metadata: Option<Metadata>,
    ) -> DispatchResult {
        self.dispatcher
            .process(trigger_type, priority, payload, metadata)
            .await
    }

    /// Invokes a registered tool. See [`ToolRegistry::invoke`].
    ///
    /// # Errors
    ///
    /// Propagates every [`ToolError`](trigger_tools::ToolError) from the
    /// registry.
    pub async fn invoke_tool(&self, name: &str, input: Value) -> ToolResult<Value> {
        self.tools.invoke(name, input).await
    }

    /// Runs an arbitrary task under `policy` on the shared worker pool.
    ///
    /// # Errors
    ///
    /// Propagates every [`ExecutionError`](trigger_executor::ExecutionError).
    pub async fn run<T>(&self, policy: &ExecutionPolicy, task: &Task<T>) -> ExecutionResult<T>
    where
        T: Send + 'static,
    {
        self.executor.execute(task, policy).await
    }

    /// Stops admitting offloaded work.
    pub fn shutdown(&self) {
        self.executor.pool().close();
        info!("trigger runtime shut down");
    }
}
