use std::fmt;

use uuid::Uuid;

#[derive(Debug)]
pub enum Error {
    Store(ag_store::Error),
    Bus(ag_bus::Error),
    Process(ag_process::Error),
    SessionNotFound(Uuid),
    RunNotFound(Uuid),
    PatternNotFound(Uuid),
    AgentNotFound(Uuid),
    InvalidConfig(String),
    AgentTimeout { seconds: u64 },
    RunawayLoop { command: String, count: u32 },
    AgentFailed(String),
    ExecutionNotActive(Uuid),
    TokenBudgetExceeded { limit: u64, used: u64 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(e) => write!(f, "persistence error: {e}"),
            Error::Bus(e) => write!(f, "event bus error: {e}"),
            Error::Process(e) => write!(f, "process controller error: {e}"),
            Error::SessionNotFound(id) => write!(f, "session {id} not found"),
            Error::RunNotFound(id) => write!(f, "run {id} not found"),
            Error::PatternNotFound(id) => write!(f, "agent pattern {id} not found"),
            Error::AgentNotFound(id) => write!(f, "agent {id} not found"),
            Error::InvalidConfig(msg) => write!(f, "invalid pattern config: {msg}"),
            Error::AgentTimeout { seconds } => {
                write!(f, "agent exceeded {seconds}s runtime limit and was aborted")
            }
            Error::RunawayLoop { command, count } => {
                write!(f, "runaway loop detected: repeated Bash command `{command}` {count} times. aborted")
            }
            Error::AgentFailed(reason) => write!(f, "agent process failed: {reason}"),
            Error::ExecutionNotActive(id) => write!(f, "run {id} has no active pattern execution"),
            Error::TokenBudgetExceeded { limit, used } => {
                write!(f, "agent exceeded token budget of {limit} (used {used}) and was aborted")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => Some(e),
            Error::Bus(e) => Some(e),
            Error::Process(e) => Some(e),
            Error::SessionNotFound(_)
            | Error::RunNotFound(_)
            | Error::PatternNotFound(_)
            | Error::AgentNotFound(_)
            | Error::InvalidConfig(_)
            | Error::AgentTimeout { .. }
            | Error::RunawayLoop { .. }
            | Error::AgentFailed(_)
            | Error::ExecutionNotActive(_)
            | Error::TokenBudgetExceeded { .. } => None,
        }
    }
}

impl From<ag_store::Error> for Error {
    fn from(e: ag_store::Error) -> Self {
        Error::Store(e)
    }
}

impl From<ag_bus::Error> for Error {
    fn from(e: ag_bus::Error) -> Self {
        Error::Bus(e)
    }
}

impl From<ag_process::Error> for Error {
    fn from(e: ag_process::Error) -> Self {
        Error::Process(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
