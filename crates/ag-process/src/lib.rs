//! Spawns and supervises the child assistant process: one-shot runs via
//! [`ProcessController`], multi-turn conversations via
//! [`InteractiveController`]. Both stream parsed events back over a
//! channel and support signal-based pause/resume/terminate.

mod command;
mod error;
mod interactive_controller;
mod lifecycle;
mod process_controller;
mod signal;

pub use error::{Error, Result};
pub use interactive_controller::InteractiveController;
pub use process_controller::ProcessController;

pub use command::assistant_bin;
