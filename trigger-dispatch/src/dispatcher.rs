//! Ordered, first-match trigger dispatch.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use trigger_executor::{
    AttemptError, ExecutionError, ExecutionPolicy, ResilientExecutor, Task, TaskError,
};
use trigger_primitives::{Metadata, Priority, TriggerContext, TriggerType};

use crate::builtin::BuiltinHandler;
use crate::handler::{HandlerError, TriggerHandler};

/// Errors surfaced by [`TriggerDispatcher`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No registered handler claims the trigger type.
    #[error("no handler registered for trigger type {trigger_type}")]
    NoHandler {
        /// The unclaimed trigger type.
        trigger_type: TriggerType,
    },

    /// A directly invoked handler failed.
    #[error("handler `{handler}` failed: {source}")]
    Handler {
        /// Name of the failing handler.
        handler: String,
        /// Error returned by the handler.
        #[source]
        source: HandlerError,
    },

    /// A policy-bound handler failed every permitted attempt.
    #[error("handler `{handler}` failed under its execution policy: {source}")]
    Execution {
        /// Name of the failing handler.
        handler: String,
        /// Error returned by the executor.
        #[source]
        source: ExecutionError,
    },

    /// Two handlers claim the same trigger type and strict checking is on.
    #[error("trigger type {trigger_type} is claimed by both `{winner}` and `{shadowed}`")]
    OverlappingCapability {
        /// Contested trigger type.
        trigger_type: TriggerType,
        /// Earlier registration that would win.
        winner: String,
        /// Later registration that would never be reached.
        shadowed: String,
    },
}

impl DispatchError {
    /// Returns `true` when the caller is at fault: no handler accepts the
    /// trigger type, or the handler rejected the payload.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NoHandler { .. })
            || matches!(self.handler_error(), Some(HandlerError::InvalidPayload(_)))
    }

    /// Returns the handler's own error, including one that ended a bounded
    /// execution as its last failed attempt.
    #[must_use]
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            Self::Handler { source, .. } => Some(source),
            Self::Execution { source, .. } => match source.last_error()? {
                AttemptError::Failed { source, .. } => source.downcast_source(),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Result alias for dispatch operations.
pub type DispatchResult<T = Value> = Result<T, DispatchError>;

#[derive(Clone)]
struct Registration {
    handler: Arc<dyn TriggerHandler>,
    policy: Option<ExecutionPolicy>,
}

/// Routes triggers to the first capable handler in registration order.
///
/// The handler list is fixed at construction; concurrent calls to
/// [`process`](Self::process) share no mutable state.
pub struct TriggerDispatcher {
    registrations: Vec<Registration>,
    executor: ResilientExecutor,
}

impl fmt::Debug for TriggerDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerDispatcher")
            .field("handlers", &self.handler_names())
            .field("executor", &self.executor)
            .finish()
    }
}

impl TriggerDispatcher {
    /// Starts building a dispatcher.
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Returns handler names in registration order.
    #[must_use]
    pub fn handler_names(&self) -> Vec<&str> {
        self.registrations
            .iter()
            .map(|registration| registration.handler.name())
            .collect()
    }

    /// Returns the name of the handler that would receive `trigger_type`.
    #[must_use]
    pub fn handler_for(&self, trigger_type: TriggerType) -> Option<&str> {
        self.select(trigger_type)
            .map(|registration| registration.handler.name())
    }

    /// Dispatches a trigger to the first handler that can handle it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoHandler`] when nothing claims
    /// `trigger_type`, [`DispatchError::Handler`] when a direct handler fails,
    /// and [`DispatchError::Execution`] when a policy-bound handler exhausts
    /// its attempts.
    pub async fn process(
        &self,
        trigger_type: TriggerType,
        priority: Priority,
        payload: Value,
        metadata: Option<Metadata>,
    ) -> DispatchResult {
        let ctx = TriggerContext::new(trigger_type, priority, metadata.unwrap_or_default());

        let Some(registration) = self.select(trigger_type) else {
            warn!(
                trigger_id = %ctx.id(),
                %trigger_type,
                %priority,
                "no handler for trigger"
            );
            return Err(DispatchError::NoHandler { trigger_type });
        };

        let handler_name = registration.handler.name().to_owned();
        info!(
            trigger_id = %ctx.id(),
            %trigger_type,
            %priority,
            handler = %handler_name,
            bounded = registration.policy.is_some(),
            "dispatching trigger"
        );

        let Some(policy) = registration.policy else {
            return registration
                .handler
                .handle(&ctx, payload)
                .await
                .map_err(|source| DispatchError::Handler {
                    handler: handler_name,
                    source,
                });
        };

        let trigger_id = ctx.id();
        let task = bounded_task(Arc::clone(&registration.handler), Arc::new(ctx), payload);
        let result = self
            .executor
            .execute(&task, &policy)
            .await
            .map_err(|source| DispatchError::Execution {
                handler: handler_name,
                source,
            });
        debug!(%trigger_id, ok = result.is_ok(), "bounded dispatch finished");
        result
    }

    fn select(&self, trigger_type: TriggerType) -> Option<&Registration> {
        self.registrations
            .iter()
            .find(|registration| registration.handler.can_handle(trigger_type))
    }
}

fn bounded_task(
    handler: Arc<dyn TriggerHandler>,
    ctx: Arc<TriggerContext>,
    payload: Value,
) -> Task<Value> {
    Task::from_async(move |_attempt| {
        let handler = Arc::clone(&handler);
        let ctx = Arc::clone(&ctx);
        let payload = payload.clone();
        async move {
            handler
                .handle(&ctx, payload)
                .await
                .map_err(TaskError::from_source)
        }
    })
}

/// Builder for [`TriggerDispatcher`].
///
/// Registration order is the tie-break rule: when two handlers claim the same
/// trigger type the earlier one always wins. By default such overlaps are
/// logged; with [`strict_capabilities`](Self::strict_capabilities) they fail
/// the build instead.
#[derive(Default)]
pub struct DispatcherBuilder {
    registrations: Vec<Registration>,
    executor: Option<ResilientExecutor>,
    strict: bool,
}

impl DispatcherBuilder {
    /// Appends a handler invoked directly.
    #[must_use]
    pub fn register<H>(self, handler: H) -> Self
    where
        H: TriggerHandler + 'static,
    {
        self.register_shared(Arc::new(handler), None)
    }

    /// Appends a handler whose invocations run under `policy`.
    #[must_use]
    pub fn register_with_policy<H>(self, handler: H, policy: ExecutionPolicy) -> Self
    where
        H: TriggerHandler + 'static,
    {
        self.register_shared(Arc::new(handler), Some(policy))
    }

    /// Appends an already shared handler with an optional policy.
    #[must_use]
    pub fn register_shared(
        mut self,
        handler: Arc<dyn TriggerHandler>,
        policy: Option<ExecutionPolicy>,
    ) -> Self {
        self.registrations.push(Registration { handler, policy });
        self
    }

    /// Appends the four built-in handlers in `Command, Event, Scheduled,
    /// Conditional` order, all invoked directly.
    #[must_use]
    pub fn with_builtin_handlers(self) -> Self {
        BuiltinHandler::ALL
            .into_iter()
            .fold(self, DispatcherBuilder::register)
    }

    /// Uses `executor` for policy-bound handlers.
    #[must_use]
    pub fn with_executor(mut self, executor: ResilientExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Rejects overlapping capabilities at build time when `strict` is set.
    #[must_use]
    pub fn strict_capabilities(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Finalises the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::OverlappingCapability`] for the first
    /// contested trigger type when strict checking is enabled.
    pub fn build(self) -> DispatchResult<TriggerDispatcher> {
        for trigger_type in TriggerType::ALL {
            let mut claimants = self
                .registrations
                .iter()
                .filter(|registration| registration.handler.can_handle(trigger_type));

            let Some(winner) = claimants.next() else {
                continue;
            };

            for shadowed in claimants {
                if self.strict {
                    return Err(DispatchError::OverlappingCapability {
                        trigger_type,
                        winner: winner.handler.name().to_owned(),
                        shadowed: shadowed.handler.name().to_owned(),
                    });
                }
                warn!(
                    %trigger_type,
                    winner = winner.handler.name(),
                    shadowed = shadowed.handler.name(),
                    "handler shadowed by earlier registration"
                );
            }
        }

        Ok(TriggerDispatcher {
            registrations: self.registrations,
            executor: self.executor.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use trigger_executor::AttemptError;

    use crate::handler::HandlerResult;

    struct CountingHandler {
        name: &'static str,
        claims: Vec<TriggerType>,
        calls: Arc<AtomicUsize>,
    }

    impl CountingHandler {
        fn new(name: &'static str, claims: &[TriggerType]) -> Self {
            Self {
                name,
                claims: claims.to_vec(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl TriggerHandler for CountingHandler {
        fn name(&self) -> &str {
            self.name
        }

        fn can_handle(&self, trigger_type: TriggerType) -> bool {
            self.claims.contains(&trigger_type)
        }

        async fn handle(&self, _ctx: &TriggerContext, _payload: Value) -> HandlerResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "handled_by": self.name }))
        }
    }

    struct FlakyHandler {
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TriggerHandler for FlakyHandler {
        fn name(&self) -> &str {
            "flaky"
        }

        fn can_handle(&self, trigger_type: TriggerType) -> bool {
            trigger_type == TriggerType::Event
        }

        async fn handle(&self, _ctx: &TriggerContext, payload: Value) -> HandlerResult {
            let seen = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if seen <= self.failures {
                return Err(HandlerError::custom(format!("failure {seen}")));
            }
            Ok(payload)
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl TriggerHandler for SlowHandler {
        fn name(&self) -> &str {
            "slow"
        }

        fn can_handle(&self, trigger_type: TriggerType) -> bool {
            trigger_type == TriggerType::Scheduled
        }

        async fn handle(&self, _ctx: &TriggerContext, _payload: Value) -> HandlerResult {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn single_matching_handler_is_invoked_once() {
        let command = CountingHandler::new("commands", &[TriggerType::Command]);
        let event = CountingHandler::new("events", &[TriggerType::Event]);
        let command_calls = Arc::clone(&command.calls);
        let event_calls = Arc::clone(&event.calls);

        let dispatcher = TriggerDispatcher::builder()
            .register(command)
            .register(event)
            .build()
            .unwrap();

        let response = dispatcher
            .process(TriggerType::Event, Priority::Medium, json!({}), None)
            .await
            .unwrap();

        assert_eq!(response["handled_by"], "events");
        assert_eq!(event_calls.load(Ordering::SeqCst), 1);
        assert_eq!(command_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unregistered_type_is_a_client_error() {
        let command = CountingHandler::new("commands", &[TriggerType::Command]);
        let calls = Arc::clone(&command.calls);
        let dispatcher = TriggerDispatcher::builder().register(command).build().unwrap();

        let err = dispatcher
            .process(TriggerType::Conditional, Priority::Low, json!({}), None)
            .await
            .expect_err("nothing handles conditional triggers");

        assert!(err.is_client_error());
        assert!(matches!(
            err,
            DispatchError::NoHandler { trigger_type: TriggerType::Conditional }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn earlier_registration_wins_overlaps() {
        let first = CountingHandler::new("first", &[TriggerType::Command, TriggerType::Event]);
        let second = CountingHandler::new("second", &[TriggerType::Command]);
        let first_calls = Arc::clone(&first.calls);
        let second_calls = Arc::clone(&second.calls);

        let dispatcher = TriggerDispatcher::builder()
            .register(first)
            .register(second)
            .build()
            .unwrap();

        for _ in 0..5 {
            let response = dispatcher
                .process(TriggerType::Command, Priority::High, json!("x"), None)
                .await
                .unwrap();
            assert_eq!(response["handled_by"], "first");
        }

        assert_eq!(dispatcher.handler_for(TriggerType::Command), Some("first"));
        assert_eq!(first_calls.load(Ordering::SeqCst), 5);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn strict_mode_rejects_overlaps() {
        let err = TriggerDispatcher::builder()
            .with_builtin_handlers()
            .register(CountingHandler::new("extra", &[TriggerType::Event]))
            .strict_capabilities(true)
            .build()
            .expect_err("event is claimed twice");

        match err {
            DispatchError::OverlappingCapability {
                trigger_type,
                winner,
                shadowed,
            } => {
                assert_eq!(trigger_type, TriggerType::Event);
                assert_eq!(winner, "event");
                assert_eq!(shadowed, "extra");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn builtin_command_scenario() {
        let dispatcher = TriggerDispatcher::builder()
            .with_builtin_handlers()
            .strict_capabilities(true)
            .build()
            .unwrap();

        let response = dispatcher
            .process(TriggerType::Command, Priority::High, json!("ls -la"), None)
            .await
            .unwrap();

        assert_eq!(response["type"], "command_response");
        assert_eq!(response["command"], "ls -la");
        assert_eq!(response["priority"], "HIGH");
        assert!(response["timestamp"].is_string());
        assert_eq!(
            dispatcher.handler_names(),
            vec!["command", "event", "scheduled", "conditional"]
        );
    }

    #[tokio::test]
    async fn direct_handler_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = TriggerDispatcher::builder()
            .register(FlakyHandler {
                failures: 1,
                calls: Arc::clone(&calls),
            })
            .build()
            .unwrap();

        let err = dispatcher
            .process(TriggerType::Event, Priority::Low, json!(1), None)
            .await
            .expect_err("no policy means a single attempt");

        assert!(!err.is_client_error());
        assert!(matches!(err, DispatchError::Handler { ref handler, .. } if handler == "flaky"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn policy_bound_handlers_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = TriggerDispatcher::builder()
            .register_with_policy(
                FlakyHandler {
                    failures: 2,
                    calls: Arc::clone(&calls),
                },
                ExecutionPolicy::new().with_retry_count(2),
            )
            .build()
            .unwrap();

        let response = dispatcher
            .process(TriggerType::Event, Priority::Critical, json!({ "id": 7 }), None)
            .await
            .unwrap();

        assert_eq!(response, json!({ "id": 7 }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejected_payload_stays_a_client_error_under_a_policy() {
        let dispatcher = TriggerDispatcher::builder()
            .register_with_policy(
                BuiltinHandler::Command,
                ExecutionPolicy::new().with_retry_count(1),
            )
            .build()
            .unwrap();

        let err = dispatcher
            .process(TriggerType::Command, Priority::High, json!("/reboot"), None)
            .await
            .expect_err("unknown special command");

        assert!(matches!(err, DispatchError::Execution { .. }));
        assert!(err.is_client_error());
        assert_eq!(
            err.handler_error(),
            Some(&HandlerError::InvalidPayload("unknown special command: /reboot".into()))
        );
    }

    #[tokio::test]
    async fn policy_bound_timeouts_surface_as_execution_errors() {
        let dispatcher = TriggerDispatcher::builder()
            .register_with_policy(
                SlowHandler,
                ExecutionPolicy::new()
                    .with_timeout(Duration::from_millis(10))
                    .with_retry_count(1),
            )
            .build()
            .unwrap();

        let err = dispatcher
            .process(TriggerType::Scheduled, Priority::Low, Value::Null, None)
            .await
            .expect_err("handler is too slow");

        let DispatchError::Execution { handler, source } = err else {
            panic!("expected execution error");
        };
        assert_eq!(handler, "slow");
        assert!(matches!(
            source.last_error(),
            Some(AttemptError::Timeout { attempt: 2, .. })
        ));
    }
}
