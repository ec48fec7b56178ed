//! Progress reporter implementation
//!
//! Uses indicatif for two bars:
//! - Tasks handed to a worker
//! - Tasks finished (with a running failure count)

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Progress reporter for dispatch runs
pub struct ProgressReporter {
    /// Multi-progress container
    multi: MultiProgress,
    /// Assigned tasks bar
    assigned_bar: ProgressBar,
    /// Finished tasks bar
    done_bar: ProgressBar,
    /// Current status message
    status: ProgressBar,
    /// Start time
    start_time: Instant,
    /// Total tasks in the run
    total_tasks: AtomicU64,
    /// Tasks assigned so far
    tasks_assigned: AtomicU64,
    /// Tasks finished so far
    tasks_done: AtomicU64,
    /// Tasks the retry policy gave up on
    tasks_failed: AtomicU64,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let status = multi.add(ProgressBar::new_spinner());
        status.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        let assigned_bar = multi.add(ProgressBar::new(0));
        assigned_bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} tasks ({percent}%)")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        assigned_bar.set_prefix("Assigned");

        let done_bar = multi.add(ProgressBar::new(0));
        done_bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} [{bar:40.green/white}] {pos}/{len} tasks ({per_sec}, ETA {eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        done_bar.set_prefix("Done    ");

        Self {
            multi,
            assigned_bar,
            done_bar,
            status,
            start_time: Instant::now(),
            total_tasks: AtomicU64::new(0),
            tasks_assigned: AtomicU64::new(0),
            tasks_done: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
        }
    }

    /// Create a disabled progress reporter (for quiet mode)
    pub fn disabled() -> Self {
        let reporter = Self::new();
        reporter.multi.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Set total tasks of the run
    pub fn set_total_tasks(&self, total: u64) {
        self.total_tasks.store(total, Ordering::Relaxed);
        self.assigned_bar.set_length(total);
        self.done_bar.set_length(total);
    }

    /// Record a task handed to a worker
    pub fn task_assigned(&self, label: &str) {
        self.tasks_assigned.fetch_add(1, Ordering::Relaxed);
        self.assigned_bar.inc(1);
        self.set_current_task(label);
    }

    /// Record a finished task
    pub fn task_finished(&self, success: bool) {
        self.tasks_done.fetch_add(1, Ordering::Relaxed);
        if !success {
            let failed = self.tasks_failed.fetch_add(1, Ordering::Relaxed) + 1;
            self.done_bar.set_message(format!("{} failed", failed));
        }
        self.done_bar.inc(1);
    }

    /// Set current status message
    pub fn set_status(&self, msg: &str) {
        self.status.set_message(msg.to_string());
    }

    fn set_current_task(&self, label: &str) {
        self.status.set_message(display_label(label));
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Finished tasks per second
    pub fn throughput(&self) -> f64 {
        let done = self.tasks_done.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            done as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Finish progress with success message
    pub fn finish_success(&self, message: &str) {
        self.status.finish_with_message(format!("✓ {}", message));
        self.assigned_bar.finish();
        self.done_bar.finish();
    }

    /// Finish progress with error message
    pub fn finish_error(&self, message: &str) {
        self.status.finish_with_message(format!("✗ {}", message));
        self.assigned_bar.abandon();
        self.done_bar.abandon();
    }

    /// Get progress summary
    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            total_tasks: self.total_tasks.load(Ordering::Relaxed),
            tasks_assigned: self.tasks_assigned.load(Ordering::Relaxed),
            tasks_done: self.tasks_done.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            throughput: self.throughput(),
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress summary
#[derive(Debug, Clone)]
pub struct ProgressSummary {
    /// Total tasks in the run
    pub total_tasks: u64,
    /// Tasks handed to a worker
    pub tasks_assigned: u64,
    /// Tasks finished
    pub tasks_done: u64,
    /// Tasks given up on
    pub tasks_failed: u64,
    /// Elapsed time
    pub elapsed: Duration,
    /// Finished tasks per second
    pub throughput: f64,
}

/// Keep the tail of long labels, cut on a char boundary
fn display_label(label: &str) -> String {
    let count = label.chars().count();
    if count > 60 {
        let tail: String = label.chars().skip(count - 57).collect();
        format!("...{}", tail)
    } else {
        label.to_string()
    }
}
