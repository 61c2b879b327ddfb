//! Common types and utilities for the sparkwrap crates.

pub mod config;
pub mod error;
pub mod job;

// Re-export shared dependencies so that all sparkwrap crates
// use the same version of them.
pub use anyhow;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use tracing_subscriber;
