//! Bounded task dispatch
//!
//! The dispatcher owns a fixed set of workers and an ordered list of tasks.
//! It walks the workers in index order, handing the next task to every idle
//! worker it finds, so tasks are assigned strictly in input order and never
//! more than `capacity` run at once. When no worker is idle it blocks on the
//! completion channel instead of polling, and once the list is exhausted it
//! drains the remaining completions before returning.

use crate::core::retry::{RetryPolicy, RetryingTask, TaskOutcome, TaskStatus};
use crate::core::task::{BoxedTask, Task};
use crate::core::worker::{Completion, Worker};
use crate::error::{collect_errors, DispatchError, Result};
use crate::progress::ProgressReporter;
use crossbeam::channel::{unbounded, Receiver};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Which worker received which task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    /// Position of the task in the input sequence
    pub task_index: usize,
    /// Worker index
    pub worker_id: usize,
}

/// Result of a dispatch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    /// One outcome per task, in input order
    pub outcomes: Vec<TaskOutcome>,
    /// Assignments in the order they were made
    pub assignments: Vec<TaskAssignment>,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

impl DispatchReport {
    /// Number of tasks in the run
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of tasks that succeeded
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Tasks the retry policy gave up on
    pub fn failed(&self) -> Vec<&TaskOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success()).collect()
    }

    /// Inner invocations across all tasks
    pub fn total_attempts(&self) -> u64 {
        self.outcomes.iter().map(|o| u64::from(o.attempts)).sum()
    }

    /// Check if every task succeeded
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(TaskOutcome::is_success)
    }

    /// Turn terminal task failures into an error
    pub fn into_result(self) -> Result<Self> {
        let results: Vec<Result<()>> = self
            .outcomes
            .iter()
            .map(|outcome| match &outcome.status {
                TaskStatus::Succeeded => Ok(()),
                TaskStatus::Failed { last_error } => Err(DispatchError::task_failed(
                    outcome.label.clone(),
                    outcome.attempts,
                    last_error.clone(),
                )),
            })
            .collect();

        collect_errors(results)?;
        Ok(self)
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Dispatch Summary ===");
        println!("Tasks:           {}", self.total());
        println!("Succeeded:       {}", self.succeeded());
        println!("Attempts:        {}", self.total_attempts());
        println!("Duration:        {}", humantime::format_duration(round_to_millis(self.duration)));

        let failed = self.failed();
        if !failed.is_empty() {
            println!("\nFailures: {}", failed.len());
            for outcome in failed {
                if let TaskStatus::Failed { last_error } = &outcome.status {
                    println!("  {} ({} attempts) - {}", outcome.label, outcome.attempts, last_error);
                }
            }
        }
    }
}

fn round_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis().min(u128::from(u64::MAX)) as u64)
}

/// Runs a batch of tasks across a fixed number of workers
pub struct Dispatcher {
    /// Worker slots, scanned in index order
    workers: Vec<Worker>,
    /// Tasks in assignment order
    tasks: Vec<BoxedTask>,
    /// Retry policy applied to every task
    policy: RetryPolicy,
    /// Completion fan-in from all workers
    completions: Receiver<Completion>,
    /// Tasks handed to a worker so far
    assigned: Arc<AtomicUsize>,
    /// Progress reporter
    progress: Option<ProgressReporter>,
}

impl Dispatcher {
    /// Create a dispatcher with `capacity` idle workers.
    ///
    /// Fails with [`DispatchError::InvalidCapacity`] when `capacity` is zero.
    pub fn new<I>(tasks: I, capacity: usize) -> Result<Self>
    where
        I: IntoIterator<Item = BoxedTask>,
    {
        if capacity == 0 {
            return Err(DispatchError::InvalidCapacity);
        }

        let (sender, completions) = unbounded();
        let workers = (0..capacity)
            .map(|id| Worker::spawn(id, sender.clone()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            workers,
            tasks: tasks.into_iter().collect(),
            policy: RetryPolicy::default(),
            completions,
            assigned: Arc::new(AtomicUsize::new(0)),
            progress: None,
        })
    }

    /// Create a dispatcher from unboxed tasks of one type
    pub fn from_tasks<T, I>(tasks: I, capacity: usize) -> Result<Self>
    where
        T: Task + 'static,
        I: IntoIterator<Item = T>,
    {
        Self::new(
            tasks.into_iter().map(|task| Box::new(task) as BoxedTask),
            capacity,
        )
    }

    /// Set the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set progress reporter
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Number of workers
    pub fn capacity(&self) -> usize {
        self.workers.len()
    }

    /// Number of tasks not yet handed to a worker
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Shared counter of tasks handed to a worker, for external progress display
    pub fn assigned_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.assigned)
    }

    /// Run every task and block until all of them have finished.
    ///
    /// With the default unbounded policy this only returns once every task has
    /// succeeded; a task that never succeeds keeps its worker, and this call,
    /// busy forever.
    pub fn run(mut self) -> Result<DispatchReport> {
        let start = Instant::now();
        let total = self.tasks.len();

        tracing::info!(tasks = total, workers = self.capacity(), "Starting dispatch");
        if let Some(progress) = &self.progress {
            progress.set_total_tasks(total as u64);
            progress.set_status("Dispatching tasks...");
        }

        let mut pending = std::mem::take(&mut self.tasks).into_iter().enumerate();
        let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; total];
        let mut assignments = Vec::with_capacity(total);
        let mut remaining = total;
        let mut in_flight = 0usize;

        while remaining > 0 {
            let mut assigned_any = false;

            for worker in self.workers.iter_mut() {
                if worker.is_busy() {
                    continue;
                }
                let Some((index, task)) = pending.next() else {
                    break;
                };

                let task = RetryingTask::new(index, task, self.policy);
                tracing::debug!("Worker {} runs {}", worker.id(), task.label());
                if let Some(progress) = &self.progress {
                    progress.task_assigned(task.label());
                }

                assignments.push(TaskAssignment {
                    task_index: index,
                    worker_id: worker.id(),
                });
                worker.assign(task);
                worker.start()?;

                in_flight += 1;
                remaining -= 1;
                self.assigned.fetch_add(1, Ordering::Relaxed);
                assigned_any = true;
            }

            // Record whatever already finished without blocking
            let mut progressed = assigned_any;
            while let Ok(completion) = self.completions.try_recv() {
                self.record(completion, &mut outcomes);
                in_flight -= 1;
                progressed = true;
            }

            if remaining > 0 && !progressed {
                // Every worker is busy: sleep until one of them finishes
                let completion = self.wait_for_completion(in_flight)?;
                self.record(completion, &mut outcomes);
                in_flight -= 1;
            }
        }

        if let Some(progress) = &self.progress {
            progress.set_status("Waiting for in-flight tasks...");
        }

        while in_flight > 0 {
            let completion = self.wait_for_completion(in_flight)?;
            self.record(completion, &mut outcomes);
            in_flight -= 1;
        }

        debug_assert!(self.workers.iter().all(|w| !w.is_busy()));

        let report = DispatchReport {
            outcomes: outcomes.into_iter().flatten().collect(),
            assignments,
            duration: start.elapsed(),
        };

        tracing::info!(
            tasks = report.total(),
            succeeded = report.succeeded(),
            attempts = report.total_attempts(),
            "Dispatch finished in {:.2?}",
            report.duration
        );

        if let Some(progress) = &self.progress {
            let summary = progress.summary();
            if report.is_success() {
                progress.finish_success(&format!(
                    "{} tasks completed ({:.1} tasks/s)",
                    summary.tasks_done, summary.throughput
                ));
            } else {
                progress.finish_error(&format!(
                    "{} of {} tasks failed",
                    summary.tasks_failed, summary.total_tasks
                ));
            }
        }

        Ok(report)
    }

    fn wait_for_completion(&self, in_flight: usize) -> Result<Completion> {
        self.completions
            .recv()
            .map_err(|_| DispatchError::PoolDisconnected(in_flight))
    }

    fn record(&self, completion: Completion, outcomes: &mut [Option<TaskOutcome>]) {
        let Completion { worker_id, outcome } = completion;
        tracing::trace!(worker = worker_id, task = %outcome.label, "Task finished");

        if let Some(progress) = &self.progress {
            progress.task_finished(outcome.is_success());
        }

        let index = outcome.index;
        outcomes[index] = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::retry::Backoff;
    use crate::core::task::NamedTask;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use std::thread;

    /// Tracks how many tasks run at the same time
    #[derive(Default)]
    struct Concurrency {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Concurrency {
        fn enter(&self) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.running.fetch_sub(1, Ordering::SeqCst);
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    fn timed_task(
        label: String,
        work: Duration,
        failures: u32,
        calls: Arc<AtomicU32>,
        concurrency: Arc<Concurrency>,
    ) -> BoxedTask {
        Box::new(NamedTask::new(label, move || {
            concurrency.enter();
            thread::sleep(work);
            concurrency.leave();
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            Ok(attempt >= failures)
        }))
    }

    #[test]
    fn test_zero_tasks_returns_immediately() {
        for capacity in [1, 4, 16] {
            let report = Dispatcher::new(Vec::new(), capacity).unwrap().run().unwrap();
            assert_eq!(report.total(), 0);
            assert!(report.assignments.is_empty());
            assert!(report.is_success());
        }
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            Dispatcher::new(Vec::new(), 0),
            Err(DispatchError::InvalidCapacity)
        ));
    }

    #[test]
    fn test_every_task_completes() {
        let calls: Vec<Arc<AtomicU32>> = (0..20).map(|_| Arc::new(AtomicU32::new(0))).collect();
        let concurrency = Arc::new(Concurrency::default());
        let tasks: Vec<BoxedTask> = calls
            .iter()
            .enumerate()
            .map(|(i, c)| {
                timed_task(
                    format!("t{}", i),
                    Duration::from_millis(1),
                    (i % 3) as u32,
                    Arc::clone(c),
                    Arc::clone(&concurrency),
                )
            })
            .collect();

        let dispatcher = Dispatcher::new(tasks, 4).unwrap();
        let assigned = dispatcher.assigned_counter();
        let report = dispatcher.run().unwrap();

        assert!(report.is_success());
        assert_eq!(report.total(), 20);
        assert_eq!(assigned.load(Ordering::SeqCst), 20);
        for (i, c) in calls.iter().enumerate() {
            assert_eq!(c.load(Ordering::SeqCst), (i % 3) as u32 + 1);
            assert_eq!(report.outcomes[i].index, i);
            assert_eq!(report.outcomes[i].attempts, (i % 3) as u32 + 1);
        }
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let concurrency = Arc::new(Concurrency::default());
        let tasks: Vec<BoxedTask> = (0..24)
            .map(|i| {
                timed_task(
                    format!("t{}", i),
                    Duration::from_millis(5),
                    1,
                    Arc::new(AtomicU32::new(0)),
                    Arc::clone(&concurrency),
                )
            })
            .collect();

        let report = Dispatcher::new(tasks, 3).unwrap().run().unwrap();

        assert!(report.is_success());
        assert!(concurrency.peak() <= 3);
        assert!(concurrency.peak() >= 2);
    }

    #[test]
    fn test_tasks_assigned_in_input_order() {
        let tasks: Vec<BoxedTask> = (0..12)
            .map(|i| {
                let work = Duration::from_millis(((12 - i) % 4) as u64 * 3);
                Box::new(NamedTask::new(format!("t{}", i), move || {
                    thread::sleep(work);
                    Ok(true)
                })) as BoxedTask
            })
            .collect();

        let report = Dispatcher::new(tasks, 4).unwrap().run().unwrap();

        let order: Vec<usize> = report.assignments.iter().map(|a| a.task_index).collect();
        assert_eq!(order, (0..12).collect::<Vec<_>>());
        // First scan fills workers 0..capacity in index order
        let first: Vec<usize> = report.assignments[..4].iter().map(|a| a.worker_id).collect();
        assert_eq!(first, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_single_capacity_serializes_tasks() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let concurrency = Arc::new(Concurrency::default());
        let tasks: Vec<BoxedTask> = (0..6)
            .map(|i| {
                let order = Arc::clone(&order);
                let concurrency = Arc::clone(&concurrency);
                Box::new(NamedTask::new(format!("t{}", i), move || {
                    concurrency.enter();
                    order.lock().unwrap().push(i);
                    thread::sleep(Duration::from_millis(10));
                    concurrency.leave();
                    Ok(true)
                })) as BoxedTask
            })
            .collect();

        let report = Dispatcher::new(tasks, 1).unwrap().run().unwrap();

        assert_eq!(*order.lock().unwrap(), (0..6).collect::<Vec<_>>());
        assert_eq!(concurrency.peak(), 1);
        assert!(report.duration >= Duration::from_millis(60));
        assert!(report.assignments.iter().all(|a| a.worker_id == 0));
    }

    #[test]
    fn test_failing_then_succeeding_scenario() {
        // A fails twice, B succeeds at once, C fails once; two workers
        let calls: Vec<Arc<AtomicU32>> = (0..3).map(|_| Arc::new(AtomicU32::new(0))).collect();
        let concurrency = Arc::new(Concurrency::default());
        let tasks = vec![
            timed_task("A".into(), Duration::from_millis(30), 2, Arc::clone(&calls[0]), Arc::clone(&concurrency)),
            timed_task("B".into(), Duration::ZERO, 0, Arc::clone(&calls[1]), Arc::clone(&concurrency)),
            timed_task("C".into(), Duration::ZERO, 1, Arc::clone(&calls[2]), Arc::clone(&concurrency)),
        ];

        let report = Dispatcher::new(tasks, 2).unwrap().run().unwrap();

        let attempts: Vec<u32> = calls.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        assert_eq!(attempts, vec![3, 1, 2]);
        assert_eq!(report.total_attempts(), 6);
        assert!(report.is_success());

        // C waits for B's worker while A is still retrying
        let workers: Vec<usize> = report.assignments.iter().map(|a| a.worker_id).collect();
        assert_eq!(workers, vec![0, 1, 1]);
        assert!(concurrency.peak() <= 2);
    }

    #[test]
    fn test_erroring_task_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let task: BoxedTask = Box::new(NamedTask::new("flaky", move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 4 {
                anyhow::bail!("connection refused");
            }
            Ok(true)
        }));

        let report = Dispatcher::new(vec![task], 2).unwrap().run().unwrap();

        assert!(report.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_bounded_policy_reports_failures() {
        let tasks: Vec<BoxedTask> = vec![
            Box::new(NamedTask::new("ok", || Ok(true))),
            Box::new(NamedTask::new("broken", || anyhow::bail!("HTTP 500"))),
            Box::new(NamedTask::new("ok too", || Ok(true))),
        ];
        let policy = RetryPolicy::bounded(3)
            .with_backoff(Backoff::new(Duration::from_millis(1), Duration::from_millis(4)));

        let report = Dispatcher::new(tasks, 2)
            .unwrap()
            .with_policy(policy)
            .with_progress(ProgressReporter::disabled())
            .run()
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.succeeded(), 2);
        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].label, "broken");
        assert_eq!(failed[0].attempts, 3);

        match report.into_result() {
            Err(DispatchError::TaskFailed { label, attempts, message }) => {
                assert_eq!(label, "broken");
                assert_eq!(attempts, 3);
                assert_eq!(message, "HTTP 500");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_from_tasks_boxes_closures() {
        let tasks = (0..5).map(|i| NamedTask::new(format!("t{}", i), || Ok(true)));
        let dispatcher = Dispatcher::from_tasks(tasks, 2).unwrap();

        assert_eq!(dispatcher.capacity(), 2);
        assert_eq!(dispatcher.pending(), 5);
        assert_eq!(dispatcher.run().unwrap().succeeded(), 5);
    }

    #[test]
    fn test_report_serializes() {
        let report = Dispatcher::from_tasks(vec![NamedTask::new("one", || Ok(true))], 1)
            .unwrap()
            .run()
            .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcomes"][0]["label"], "one");
        assert_eq!(json["outcomes"][0]["status"], "succeeded");
        assert_eq!(json["assignments"][0]["worker_id"], 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_capacity_and_completeness(capacity in 1usize..5, count in 0usize..12, failures in 0u32..3) {
            let concurrency = Arc::new(Concurrency::default());
            let calls: Vec<Arc<AtomicU32>> = (0..count).map(|_| Arc::new(AtomicU32::new(0))).collect();
            let tasks: Vec<BoxedTask> = calls
                .iter()
                .enumerate()
                .map(|(i, c)| timed_task(
                    format!("t{}", i),
                    Duration::from_millis(1),
                    failures,
                    Arc::clone(c),
                    Arc::clone(&concurrency),
                ))
                .collect();

            let report = Dispatcher::new(tasks, capacity).unwrap().run().unwrap();

            prop_assert!(concurrency.peak() <= capacity);
            prop_assert_eq!(report.total(), count);
            prop_assert!(report.is_success());
            for c in &calls {
                prop_assert_eq!(c.load(Ordering::SeqCst), failures + 1);
            }
            let order: Vec<usize> = report.assignments.iter().map(|a| a.task_index).collect();
            prop_assert_eq!(order, (0..count).collect::<Vec<_>>());
        }
    }
}
