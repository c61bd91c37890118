//! Sequencing, persistence, and fan-out for the agentling control plane.
//!
//! [`EventBus`] owns the persist-before-dispatch invariant; [`ConnectionRegistry`]
//! is the transport-agnostic registry logic behind the WebSocket surface (the
//! surface itself lives outside this workspace).

mod error;
mod event_bus;
mod fanout;

pub use error::{Error, Result};
pub use event_bus::{EventBus, EventHandler, SubscriptionId};
pub use fanout::{Connection, ConnectionId, ConnectionRegistry, ControlMessage};
