//! Error handling system using `thiserror`.
//!
//! Domain errors are precise enums; the binary adds operational context with
//! `anyhow` at its edge.

pub mod domain;

pub use domain::{SyncError, WatchError};
