//! Core dispatch engine
//!
//! Provides the task abstraction, the retrying wrapper, worker slots and
//! the dispatcher that runs a batch across a fixed number of workers.

mod dispatcher;
mod retry;
mod task;
mod worker;

pub use dispatcher::*;
pub use retry::*;
pub use task::*;
pub use worker::*;
