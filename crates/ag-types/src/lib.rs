//! Shared data model and event taxonomy for the agentling control plane.
//!
//! Every other crate in the workspace depends on this one; it has no
//! dependency on anything that spawns processes, touches a database, or
//! talks to the network.

mod agent;
mod error;
mod event;
mod git;
mod memory;
mod run;
mod session;

pub use agent::{Agent, AgentRun, AgentRunStatus, AgentPattern, HumanInvolvement, PatternType};
pub use error::{Error, Result};
pub use event::{
    Event, EventKind, GitSnapshotPayload, InterventionPayload, MetricsPayload, Payload,
};
pub use git::{FileChange, FileChangeType, GitSnapshot};
pub use memory::{ContextPack, PhaseCounts, RunMemory, RunMemoryEntry, SessionSnapshot};
pub use run::{Run, RunStatus};
pub use session::{Session, SessionStatus};
