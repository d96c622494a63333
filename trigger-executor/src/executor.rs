//! Policy-driven execution with per-attempt timeouts and immediate retries.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::invocation::{Invocation, InvocationEvent, TransitionError};
use crate::policy::{ExecutionMode, ExecutionPolicy};
use crate::pool::WorkerPool;
use crate::task::{Attempt, Task, TaskError, TaskResult};

/// Failure of a single attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    /// The attempt did not finish within the policy timeout.
    #[error("attempt {attempt} timed out after {elapsed:?}")]
    Timeout {
        /// 1-based attempt number.
        attempt: u32,
        /// The timeout that elapsed.
        elapsed: Duration,
    },

    /// The task body returned an error.
    #[error("attempt {attempt} failed: {source}")]
    Failed {
        /// 1-based attempt number.
        attempt: u32,
        /// Error returned by the task body.
        #[source]
        source: TaskError,
    },

    /// Offloaded work panicked.
    #[error("attempt {attempt} panicked: {reason}")]
    Panicked {
        /// 1-based attempt number.
        attempt: u32,
        /// Panic payload rendered as text.
        reason: String,
    },
}

impl AttemptError {
    /// Returns the attempt number the error belongs to.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        match self {
            Self::Timeout { attempt, .. }
            | Self::Failed { attempt, .. }
            | Self::Panicked { attempt, .. } => *attempt,
        }
    }

    /// Returns `true` for timeouts.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors surfaced by [`ResilientExecutor::execute`].
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Every permitted attempt failed; only the last error is kept.
    #[error("execution exhausted after {attempts} attempt(s): {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last: AttemptError,
    },

    /// The worker pool was closed before an offloaded attempt could start.
    #[error("worker pool closed")]
    PoolClosed,

    /// The attempt state machine rejected a transition.
    #[error(transparent)]
    State(#[from] TransitionError),
}

impl ExecutionError {
    /// Returns the final attempt error when execution was exhausted.
    #[must_use]
    pub fn last_error(&self) -> Option<&AttemptError> {
        match self {
            Self::Exhausted { last, .. } => Some(last),
            _ => None,
        }
    }
}

/// Result alias for executor operations.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

enum Interrupt {
    Attempt(AttemptError),
    PoolClosed,
}

/// Runs tasks under an [`ExecutionPolicy`].
///
/// Attempts are strictly sequential: the next attempt starts only after the
/// previous one succeeded, failed, or timed out. On timeout the attempt's
/// cancellation token is cancelled and offloaded async work is aborted;
/// blocking work stops only if it observes the token.
#[derive(Debug, Clone, Default)]
pub struct ResilientExecutor {
    pool: WorkerPool,
}

impl ResilientExecutor {
    /// Creates an executor that offloads onto `pool`.
    #[must_use]
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    /// Returns the worker pool used for offloaded attempts.
    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Executes `task` under `policy`, returning the first successful result.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Exhausted`] wrapping the last attempt error
    /// when all `retry_count + 1` attempts fail, or
    /// [`ExecutionError::PoolClosed`] when offloaded work cannot be admitted.
    pub async fn execute<T>(&self, task: &Task<T>, policy: &ExecutionPolicy) -> ExecutionResult<T>
    where
        T: Send + 'static,
    {
        let mut invocation = Invocation::new(policy.max_attempts());
        invocation.transition(InvocationEvent::Start)?;

        loop {
            let attempt = Attempt::new(invocation.attempts());
            debug!(
                attempt = attempt.number(),
                max_attempts = policy.max_attempts(),
                mode = ?policy.mode(),
                priority = policy.priority(),
                "starting attempt"
            );

            let error = match self.run_attempt(task, policy, attempt).await {
                Ok(value) => {
                    invocation.transition(InvocationEvent::Succeed)?;
                    return Ok(value);
                }
                Err(Interrupt::PoolClosed) => return Err(ExecutionError::PoolClosed),
                Err(Interrupt::Attempt(error)) => error,
            };

            let event = if error.is_timeout() {
                InvocationEvent::TimeOut
            } else {
                InvocationEvent::Fail
            };
            invocation.transition(event)?;

            if !invocation.has_remaining() {
                invocation.transition(InvocationEvent::Exhaust)?;
                warn!(
                    attempts = invocation.attempts(),
                    error = %error,
                    "execution exhausted"
                );
                return Err(ExecutionError::Exhausted {
                    attempts: invocation.attempts(),
                    last: error,
                });
            }

            warn!(error = %error, "attempt failed, retrying");
            invocation.transition(InvocationEvent::Retry)?;
        }
    }

    async fn run_attempt<T>(
        &self,
        task: &Task<T>,
        policy: &ExecutionPolicy,
        attempt: Attempt,
    ) -> Result<T, Interrupt>
    where
        T: Send + 'static,
    {
        let number = attempt.number();
        let cancellation = attempt.cancellation().clone();
        let runs_on_caller = policy.mode() == ExecutionMode::Inline && task.is_blocking();
        let started = Instant::now();
        let work = self.start(task, policy.mode(), attempt);

        let Some(limit) = policy.timeout() else {
            return work.await;
        };

        match tokio::time::timeout(limit, work).await {
            // Inline blocking bodies cannot be preempted, so their overrun is
            // only visible once they return.
            Ok(_) if runs_on_caller && started.elapsed() > limit => {
                Err(Interrupt::Attempt(AttemptError::Timeout {
                    attempt: number,
                    elapsed: limit,
                }))
            }
            Ok(result) => result,
            Err(_) => {
                cancellation.cancel();
                Err(Interrupt::Attempt(AttemptError::Timeout {
                    attempt: number,
                    elapsed: limit,
                }))
            }
        }
    }

    fn start<T>(
        &self,
        task: &Task<T>,
        mode: ExecutionMode,
        attempt: Attempt,
    ) -> BoxFuture<'static, Result<T, Interrupt>>
    where
        T: Send + 'static,
    {
        let number = attempt.number();
        match (mode, task) {
            (ExecutionMode::Inline, Task::Async(body)) => {
                let body = Arc::clone(body);
                let work = async move { body(attempt).await };
                catch_panic(number, work).boxed()
            }
            (ExecutionMode::Inline, Task::Blocking(body)) => {
                let body = Arc::clone(body);
                let work = async move { body(attempt) };
                catch_panic(number, work).boxed()
            }
            (ExecutionMode::Offloaded, Task::Async(body)) => {
                let pool = self.pool.clone();
                let future = body(attempt);
                async move {
                    let handle = pool
                        .spawn(future)
                        .await
                        .map_err(|_| Interrupt::PoolClosed)?;
                    join(number, AbortOnDrop(handle)).await
                }
                .boxed()
            }
            (ExecutionMode::Offloaded, Task::Blocking(body)) => {
                let pool = self.pool.clone();
                let body = Arc::clone(body);
                async move {
                    let handle = pool
                        .spawn_blocking(move || body(attempt))
                        .await
                        .map_err(|_| Interrupt::PoolClosed)?;
                    join(number, AbortOnDrop(handle)).await
                }
                .boxed()
            }
        }
    }
}

/// Aborts the spawned task if the caller stops waiting for it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn join<T>(number: u32, mut handle: AbortOnDrop<TaskResult<T>>) -> Result<T, Interrupt> {
    match (&mut handle.0).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(failed(number, source)),
        Err(err) if err.is_panic() => Err(Interrupt::Attempt(AttemptError::Panicked {
            attempt: number,
            reason: panic_reason(err.into_panic().as_ref()),
        })),
        Err(_) => Err(failed(number, TaskError::new("worker task cancelled"))),
    }
}

async fn catch_panic<T, F>(number: u32, work: F) -> Result<T, Interrupt>
where
    F: Future<Output = TaskResult<T>> + Send,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result.map_err(|source| failed(number, source)),
        Err(payload) => Err(Interrupt::Attempt(AttemptError::Panicked {
            attempt: number,
            reason: panic_reason(payload.as_ref()),
        })),
    }
}

fn failed(attempt: u32, source: TaskError) -> Interrupt {
    Interrupt::Attempt(AttemptError::Failed { attempt, source })
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use crate::pool::PoolConfig;

    fn counting_task(calls: &Arc<AtomicU32>, fail_first: u32) -> Task<u32> {
        let calls = Arc::clone(calls);
        Task::from_async(move |attempt: Attempt| {
            let calls = Arc::clone(&calls);
            async move {
                let seen = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if seen <= fail_first {
                    Err(TaskError::new(format!("boom {seen}")))
                } else {
                    Ok(attempt.number())
                }
            }
        })
    }

    #[tokio::test]
    async fn always_failing_task_runs_retry_count_plus_one_times() {
        let executor = ResilientExecutor::default();
        let calls = Arc::new(AtomicU32::new(0));
        let task = counting_task(&calls, u32::MAX);
        let policy = ExecutionPolicy::new().with_retry_count(3);

        let err = executor
            .execute(&task, &policy)
            .await
            .expect_err("should exhaust");

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            ExecutionError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert_eq!(last.attempt(), 4);
                assert!(matches!(
                    last,
                    AttemptError::Failed { ref source, .. } if source.reason() == "boom 4"
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_without_extra_attempts() {
        let executor = ResilientExecutor::default();
        let calls = Arc::new(AtomicU32::new(0));
        let task = counting_task(&calls, 2);
        let policy = ExecutionPolicy::new().with_retry_count(5);

        let value = executor.execute(&task, &policy).await.unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_still_reports_exhaustion() {
        let executor = ResilientExecutor::default();
        let calls = Arc::new(AtomicU32::new(0));
        let task = counting_task(&calls, 1);

        let err = executor
            .execute(&task, &ExecutionPolicy::new())
            .await
            .expect_err("single attempt fails");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ExecutionError::Exhausted { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_inline_attempts_time_out_and_count_toward_budget() {
        let executor = ResilientExecutor::default();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let task = Task::from_async(move |_attempt: Attempt| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(())
            }
        });
        let policy = ExecutionPolicy::new()
            .with_timeout(Duration::from_secs(1))
            .with_retry_count(2);

        let started = tokio::time::Instant::now();
        let err = executor
            .execute(&task, &policy)
            .await
            .expect_err("every attempt times out");

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(
            err.last_error(),
            Some(&AttemptError::Timeout {
                attempt: 3,
                elapsed: Duration::from_secs(1),
            })
        );
    }

    #[tokio::test]
    async fn timeout_then_success_returns_value() {
        let executor = ResilientExecutor::default();
        let task = Task::from_async(|attempt: Attempt| async move {
            if attempt.number() == 1 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(attempt.number())
        });
        let policy = ExecutionPolicy::new()
            .with_timeout(Duration::from_millis(20))
            .with_retry_count(1);

        assert_eq!(executor.execute(&task, &policy).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn offloaded_blocking_work_observes_cancellation() {
        let executor = ResilientExecutor::default();
        let observed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&observed);
        let task = Task::blocking(move |attempt: Attempt| {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if attempt.is_cancelled() {
                    flag.store(true, Ordering::SeqCst);
                    return Err(TaskError::new("cancelled"));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        });
        let policy = ExecutionPolicy::new()
            .with_mode(ExecutionMode::Offloaded)
            .with_timeout(Duration::from_millis(30));

        let err = executor
            .execute(&task, &policy)
            .await
            .expect_err("should time out");
        assert!(err.last_error().is_some_and(AttemptError::is_timeout));

        let deadline = Instant::now() + Duration::from_secs(2);
        while !observed.load(Ordering::SeqCst) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn offloaded_async_work_is_aborted_on_timeout() {
        let executor = ResilientExecutor::default();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let task = Task::from_async(move |_attempt: Attempt| {
            let flag = Arc::clone(&flag);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        });
        let policy = ExecutionPolicy::new()
            .with_mode(ExecutionMode::Offloaded)
            .with_timeout(Duration::from_millis(10));

        assert!(executor.execute(&task, &policy).await.is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(
            executor.pool().available_workers(),
            executor.pool().config().max_workers().get()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn inline_blocking_overrun_counts_as_timeout() {
        let executor = ResilientExecutor::default();
        let task = Task::blocking(|_attempt: Attempt| {
            std::thread::sleep(Duration::from_millis(30));
            Ok("late")
        });
        let policy = ExecutionPolicy::new().with_timeout(Duration::from_millis(5));

        let err = executor
            .execute(&task, &policy)
            .await
            .expect_err("overrun is reported");
        assert!(err.last_error().is_some_and(AttemptError::is_timeout));
    }

    #[tokio::test]
    async fn offloaded_panics_are_retryable_failures() {
        let executor = ResilientExecutor::default();
        let task = Task::from_async(|attempt: Attempt| async move {
            if attempt.number() == 1 {
                panic!("first attempt explodes");
            }
            Ok(attempt.number())
        });
        let policy = ExecutionPolicy::new()
            .with_mode(ExecutionMode::Offloaded)
            .with_retry_count(1);

        assert_eq!(executor.execute(&task, &policy).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn inline_panics_are_retryable_failures() {
        let executor = ResilientExecutor::default();
        let task = Task::from_async(|attempt: Attempt| async move {
            if attempt.number() == 1 {
                panic!("first attempt explodes");
            }
            Ok(attempt.number())
        });
        let policy = ExecutionPolicy::new().with_retry_count(1);

        assert_eq!(executor.execute(&task, &policy).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn inline_blocking_panic_exhausts_budget() {
        let executor = ResilientExecutor::default();
        let task: Task<()> = Task::blocking(|_attempt| panic!("always explodes"));

        let err = executor
            .execute(&task, &ExecutionPolicy::new().with_retry_count(2))
            .await
            .expect_err("every attempt panics");

        match err {
            ExecutionError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(
                    last,
                    AttemptError::Panicked { attempt: 3, ref reason } if reason == "always explodes"
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_pool_is_not_retried() {
        let pool = WorkerPool::new(PoolConfig::new(NonZeroUsize::new(1).unwrap()));
        pool.close();
        let executor = ResilientExecutor::new(pool);
        let calls = Arc::new(AtomicU32::new(0));
        let task = counting_task(&calls, 0);
        let policy = ExecutionPolicy::new()
            .with_mode(ExecutionMode::Offloaded)
            .with_retry_count(3);

        let err = executor
            .execute(&task, &policy)
            .await
            .expect_err("pool is closed");
        assert!(matches!(err, ExecutionError::PoolClosed));
    }
}
