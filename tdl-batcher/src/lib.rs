//! tdl-batcher library crate.
//!
//! Collects individually submitted download requests into batches, groups
//! them by destination, runs one `tdl` transfer per group, and keeps every
//! requester's status message up to date.

pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod notify;
pub mod scheduler;
pub mod transfer;

pub use error::{Error, Result};
