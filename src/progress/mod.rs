//! Progress reporting module
//!
//! Shows how many tasks were handed to workers and how many have finished.

mod reporter;

pub use reporter::*;
