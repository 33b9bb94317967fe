//! Mirror configuration.
//!
//! This module provides the validated settings the scheduler is built from.

pub mod settings;

pub use settings::{ConfigError, SyncSettings, TimeUnit};
