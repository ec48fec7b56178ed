//! # TransferPool - Bounded, Retrying Batch Transfers
//!
//! TransferPool runs many independent, idempotent jobs (typically one file
//! transfer each) across a fixed number of workers. Every job is retried until
//! it succeeds, and the caller blocks until the whole batch is done.
//!
//! ## Features
//!
//! - **Fixed Capacity**: never more than `capacity` jobs run at once
//! - **Ordered Assignment**: jobs are handed out in input order, each to the
//!   first idle worker in index order
//! - **Retry Until Success**: failures, errors and panics are retried; an
//!   opt-in bounded policy adds exponential backoff and reports give-ups
//! - **Event-driven Completion**: the dispatcher sleeps on a completion
//!   channel instead of polling workers
//! - **Local Transfers**: a planner that turns a directory tree into copy tasks
//!
//! ## Quick Start
//!
//! ```no_run
//! use transferpool::core::{BoxedTask, Dispatcher, NamedTask};
//!
//! let tasks: Vec<BoxedTask> = (0..100)
//!     .map(|i| Box::new(NamedTask::new(format!("file-{}", i), || {
//!         // upload one file; Ok(false) or Err(_) means "try again"
//!         Ok(true)
//!     })) as BoxedTask)
//!     .collect();
//!
//! let report = Dispatcher::new(tasks, 16).unwrap().run().unwrap();
//! assert!(report.is_success());
//! ```
//!
//! ## Bounded Retries
//!
//! ```no_run
//! use std::time::Duration;
//! use transferpool::core::{Backoff, Dispatcher, NamedTask, RetryPolicy};
//!
//! let policy = RetryPolicy::bounded(5)
//!     .with_backoff(Backoff::new(Duration::from_millis(100), Duration::from_secs(5)));
//!
//! let report = Dispatcher::from_tasks(vec![NamedTask::new("a.json", || Ok(true))], 4)
//!     .unwrap()
//!     .with_policy(policy)
//!     .run()
//!     .unwrap();
//!
//! for outcome in report.failed() {
//!     eprintln!("{} gave up after {} attempts", outcome.label, outcome.attempts);
//! }
//! ```
//!
//! ## Directory Transfer
//!
//! ```no_run
//! use transferpool::core::Dispatcher;
//! use transferpool::progress::ProgressReporter;
//! use transferpool::transfer::{TransferOptions, TransferPlan};
//! use std::path::Path;
//!
//! let plan = TransferPlan::scan(Path::new("./data"), Path::new("/mnt/repo"), &TransferOptions::default()).unwrap();
//! let report = Dispatcher::new(plan.into_tasks(), 32)
//!     .unwrap()
//!     .with_progress(ProgressReporter::new())
//!     .run()
//!     .unwrap();
//! report.print_summary();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod progress;
pub mod transfer;

// Re-export commonly used types
pub use crate::config::DispatchConfig;
pub use crate::core::{Dispatcher, DispatchReport, RetryPolicy, Task};
pub use crate::error::{DispatchError, Result};
pub use crate::progress::ProgressReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use transferpool::prelude::*;
    //! ```

    pub use crate::config::{DispatchConfig, RetryConfig};
    pub use crate::core::{
        Backoff, BoxedTask, DispatchReport, Dispatcher, NamedTask, RetryPolicy, Task, TaskOutcome,
        TaskStatus,
    };
    pub use crate::error::{DispatchError, Result};
    pub use crate::progress::ProgressReporter;
    pub use crate::transfer::{FileTransfer, TransferOptions, TransferPlan};
}
