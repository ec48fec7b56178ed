//! Configuration module for TransferPool
//!
//! Provides CLI arguments, config files and runtime settings.

mod settings;

pub use settings::*;
