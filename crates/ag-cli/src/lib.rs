//! Command-line surface for the agentling control plane. A thin layer over
//! `ag-session`/`ag-patterns`: parses arguments, bootstraps the
//! process-lifetime singletons, dispatches to a handler, and renders
//! whatever events come back as plain text.

mod args;
mod commands;
pub mod config;
pub mod context;
mod error;
mod handlers;

pub use args::Cli;
pub use commands::run;
pub use error::{Error, Result};
