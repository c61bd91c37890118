use std::fmt;

use uuid::Uuid;

#[derive(Debug)]
pub enum Error {
    Store(ag_store::Error),
    Bus(ag_bus::Error),
    Process(ag_process::Error),
    SessionNotFound(Uuid),
    RunNotFound(Uuid),
    EventNotFound(Uuid),
    RunNotActive(Uuid),
    InteractiveNotActive(Uuid),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(e) => write!(f, "persistence error: {e}"),
            Error::Bus(e) => write!(f, "event bus error: {e}"),
            Error::Process(e) => write!(f, "process controller error: {e}"),
            Error::SessionNotFound(id) => write!(f, "session {id} not found"),
            Error::RunNotFound(id) => write!(f, "run {id} not found"),
            Error::EventNotFound(id) => write!(f, "event {id} not found"),
            Error::RunNotActive(id) => write!(f, "run {id} has no active process controller"),
            Error::InteractiveNotActive(id) => write!(f, "run {id} has no active interactive session"),
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
            | Error::EventNotFound(_)
            | Error::RunNotActive(_)
            | Error::InteractiveNotActive(_) => None,
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
