//! Request preparation on top of the gateway clients: location rewriting,
//! environment injection and per-request identity.

pub mod context;
pub mod files;
pub mod jobs;
pub mod location;
