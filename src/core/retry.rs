//! Retry policy and the retrying task wrapper
//!
//! The default policy retries forever without delay: a transfer that keeps
//! failing keeps its worker busy until it succeeds. A bounded policy adds a
//! maximum attempt count and capped exponential backoff, after which the task
//! is reported as failed instead.

use crate::core::task::BoxedTask;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

/// Exponential backoff between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    /// Create a backoff starting at `base` and never exceeding `max`
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Retry immediately
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Delay to wait after the given number of failed attempts (0-based)
    pub fn delay(&self, failures: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = failures.min(16);
        Duration::from_millis(base_ms.saturating_mul(1u64 << shift).min(max_ms))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::none()
    }
}

/// When and how often a failed task is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Retry until success, immediately
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            backoff: Backoff::none(),
        }
    }

    /// Give up after `max_attempts` attempts (at least one)
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            backoff: Backoff::none(),
        }
    }

    /// Wait between attempts according to `backoff`
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Attempt limit, `None` when unbounded
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Backoff schedule
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    fn allows_another(&self, attempts_made: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts_made < max,
            None => true,
        }
    }
}

/// Final state of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskStatus {
    /// The task reported success
    Succeeded,
    /// The retry policy gave up
    Failed {
        /// Message of the last failed attempt
        last_error: String,
    },
}

/// What happened to one task of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Position in the input sequence
    pub index: usize,
    /// Task label
    pub label: String,
    /// Number of times the inner task was invoked
    pub attempts: u32,
    /// Final state
    #[serde(flatten)]
    pub status: TaskStatus,
}

impl TaskOutcome {
    /// Check if the task succeeded
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

/// Wraps a task and re-invokes it until it succeeds or the policy gives up
pub struct RetryingTask {
    index: usize,
    label: String,
    inner: BoxedTask,
    policy: RetryPolicy,
    attempts: u32,
    status: Option<TaskStatus>,
}

impl RetryingTask {
    /// Wrap the task at position `index` of a run
    pub fn new(index: usize, inner: BoxedTask, policy: RetryPolicy) -> Self {
        let label = inner.label();
        Self {
            index,
            label,
            inner,
            policy,
            attempts: 0,
            status: None,
        }
    }

    /// Position in the input sequence
    pub fn index(&self) -> usize {
        self.index
    }

    /// Task label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Inner invocations so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Check if the task reached a final state
    pub fn is_done(&self) -> bool {
        self.status.is_some()
    }

    /// Run attempts until the task succeeds or the policy gives up.
    ///
    /// Errors and panics raised by the inner task count as failed attempts and
    /// never escape. Once finished, further calls return the recorded outcome
    /// without invoking the inner task again.
    pub fn run(&mut self) -> TaskOutcome {
        if let Some(status) = self.status.clone() {
            return self.outcome(status);
        }

        let status = loop {
            self.attempts += 1;
            match self.attempt_once() {
                Ok(()) => {
                    tracing::debug!(task = %self.label, attempts = self.attempts, "Task succeeded");
                    break TaskStatus::Succeeded;
                }
                Err(message) => {
                    tracing::debug!(
                        task = %self.label,
                        attempt = self.attempts,
                        error = %message,
                        "Attempt failed"
                    );

                    if !self.policy.allows_another(self.attempts) {
                        tracing::warn!(
                            task = %self.label,
                            attempts = self.attempts,
                            "Giving up: {}",
                            message
                        );
                        break TaskStatus::Failed { last_error: message };
                    }

                    let delay = self.policy.backoff().delay(self.attempts - 1);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
            }
        };

        self.status = Some(status.clone());
        self.outcome(status)
    }

    fn attempt_once(&mut self) -> Result<(), String> {
        let inner = &mut self.inner;
        match panic::catch_unwind(AssertUnwindSafe(|| inner.attempt())) {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err("task reported failure".to_string()),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(payload) => Err(format!("task panicked: {}", panic_message(payload.as_ref()))),
        }
    }

    fn outcome(&self, status: TaskStatus) -> TaskOutcome {
        TaskOutcome {
            index: self.index,
            label: self.label.clone(),
            attempts: self.attempts,
            status,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::NamedTask;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn flaky(label: &str, failures: u32, calls: Arc<AtomicU32>) -> BoxedTask {
        Box::new(NamedTask::new(label, move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok(n >= failures)
        }))
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(800));
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(10), Duration::from_millis(800));
        assert_eq!(Backoff::none().delay(5), Duration::ZERO);
    }

    #[test]
    fn test_backoff_max_never_below_base() {
        let backoff = Backoff::new(Duration::from_millis(50), Duration::from_millis(10));
        assert_eq!(backoff.delay(0), Duration::from_millis(50));
        assert_eq!(backoff.delay(4), Duration::from_millis(50));
    }

    #[test]
    fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut task = RetryingTask::new(0, flaky("a", 3, Arc::clone(&calls)), RetryPolicy::unbounded());

        let outcome = task.run();

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(task.is_done());
    }

    #[test]
    fn test_error_counts_as_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let inner: BoxedTask = Box::new(NamedTask::new("erroring", move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                anyhow::bail!("connection reset");
            }
            Ok(true)
        }));

        let outcome = RetryingTask::new(0, inner, RetryPolicy::unbounded()).run();

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_panic_counts_as_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let inner: BoxedTask = Box::new(NamedTask::new("panicking", move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("decoder blew up");
            }
            Ok(true)
        }));

        let outcome = RetryingTask::new(0, inner, RetryPolicy::unbounded()).run();

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 2);
    }

    #[test]
    fn test_completed_task_is_not_reinvoked() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut task = RetryingTask::new(7, flaky("once", 0, Arc::clone(&calls)), RetryPolicy::unbounded());

        let first = task.run();
        let second = task.run();

        assert_eq!(first, second);
        assert_eq!(second.index, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bounded_policy_gives_up() {
        let inner: BoxedTask = Box::new(NamedTask::new("doomed", || anyhow::bail!("HTTP 503")));
        let policy = RetryPolicy::bounded(3)
            .with_backoff(Backoff::new(Duration::from_millis(1), Duration::from_millis(2)));

        let outcome = RetryingTask::new(0, inner, policy).run();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            outcome.status,
            TaskStatus::Failed {
                last_error: "HTTP 503".to_string()
            }
        );
    }

    #[test]
    fn test_bounded_policy_succeeds_within_limit() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome =
            RetryingTask::new(0, flaky("late", 2, Arc::clone(&calls)), RetryPolicy::bounded(3)).run();

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_bounded_zero_means_one_attempt() {
        assert_eq!(RetryPolicy::bounded(0).max_attempts(), Some(1));
        assert_eq!(RetryPolicy::default(), RetryPolicy::unbounded());
    }
}
