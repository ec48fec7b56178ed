//! The unit of work a pool runs
//!
//! A task is invoked with no arguments and answers whether it succeeded.
//! Returning `Ok(false)` and returning `Err(_)` are treated the same way: the
//! attempt failed and may be repeated, so implementations must be idempotent.

/// An idempotent, re-invocable unit of work
pub trait Task: Send {
    /// Run one attempt. `Ok(true)` means done for good.
    fn attempt(&mut self) -> anyhow::Result<bool>;

    /// Short human-readable name used in logs and reports
    fn label(&self) -> String {
        String::from("task")
    }
}

impl<F> Task for F
where
    F: FnMut() -> anyhow::Result<bool> + Send,
{
    fn attempt(&mut self) -> anyhow::Result<bool> {
        self()
    }
}

/// A closure task with an explicit label
pub struct NamedTask<F> {
    name: String,
    func: F,
}

impl<F> NamedTask<F>
where
    F: FnMut() -> anyhow::Result<bool> + Send,
{
    /// Wrap a closure under the given name
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Task for NamedTask<F>
where
    F: FnMut() -> anyhow::Result<bool> + Send,
{
    fn attempt(&mut self) -> anyhow::Result<bool> {
        (self.func)()
    }

    fn label(&self) -> String {
        self.name.clone()
    }
}

/// Boxed task as stored by the dispatcher
pub type BoxedTask = Box<dyn Task>;
