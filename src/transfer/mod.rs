//! Local batch transfer
//!
//! Plans one idempotent copy task per file of a source tree so a whole
//! directory can be pushed through the dispatcher.

mod file;
mod plan;

pub use file::*;
pub use plan::*;
