//! Session and run lifecycle management for the agentling control plane:
//! owns the active `ProcessController`/`InteractiveController` instances,
//! drives git snapshotting around tool results, routes pause/resume/inject/
//! abort, branching, and end-of-session memory extraction.

mod error;
mod manager;

pub use error::{Error, Result};
pub use manager::SessionManager;
