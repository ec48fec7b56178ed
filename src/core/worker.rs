//! Worker slots of the dispatch pool
//!
//! Each worker owns one long-lived thread and runs at most one task at a time.
//! The busy flag is set by the dispatcher on assignment and cleared by the
//! worker thread when the task returns, before the completion event is sent.

use crate::core::retry::{RetryingTask, TaskOutcome};
use crate::error::{DispatchError, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Event sent by a worker thread when its task is finished
#[derive(Debug)]
pub struct Completion {
    /// Worker that ran the task
    pub worker_id: usize,
    /// Final outcome of the task
    pub outcome: TaskOutcome,
}

/// A single concurrency slot
pub struct Worker {
    id: usize,
    busy: Arc<AtomicBool>,
    assigned: Option<RetryingTask>,
    sender: Option<Sender<RetryingTask>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn the worker thread. Finished tasks are reported on `completions`.
    pub fn spawn(id: usize, completions: Sender<Completion>) -> Result<Self> {
        // One slot: the dispatcher only hands over a task once the previous one returned
        let (sender, receiver) = bounded::<RetryingTask>(1);
        let busy = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&busy);

        let handle = thread::Builder::new()
            .name(format!("transferpool-worker-{}", id))
            .spawn(move || worker_loop(id, receiver, flag, completions))
            .map_err(|source| DispatchError::WorkerSpawn {
                worker_id: id,
                source,
            })?;

        Ok(Self {
            id,
            busy,
            assigned: None,
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Worker index within its pool
    pub fn id(&self) -> usize {
        self.id
    }

    /// Bind a task to this worker and mark it busy.
    ///
    /// The worker must be idle; keeping that true is the dispatcher's job.
    pub fn assign(&mut self, task: RetryingTask) {
        debug_assert!(!self.is_busy(), "worker {} assigned while busy", self.id);
        self.assigned = Some(task);
        self.busy.store(true, Ordering::Release);
    }

    /// Hand the assigned task to the worker thread without waiting for it
    pub fn start(&mut self) -> Result<()> {
        let Some(task) = self.assigned.take() else {
            return Ok(());
        };

        let delivered = match &self.sender {
            Some(sender) => sender.send(task).is_ok(),
            None => false,
        };

        if delivered {
            Ok(())
        } else {
            self.busy.store(false, Ordering::Release);
            Err(DispatchError::WorkerLost(self.id))
        }
    }

    /// Check whether a task is assigned and has not returned yet
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the slot ends the worker loop
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Worker {} thread panicked", self.id);
            }
        }
    }
}

fn worker_loop(
    id: usize,
    tasks: Receiver<RetryingTask>,
    busy: Arc<AtomicBool>,
    completions: Sender<Completion>,
) {
    for mut task in tasks.iter() {
        tracing::trace!(worker = id, task = %task.label(), "Task started");
        let outcome = task.run();
        busy.store(false, Ordering::Release);

        if completions.send(Completion { worker_id: id, outcome }).is_err() {
            break;
        }
    }

    tracing::debug!("Worker {} shutting down", id);
}
