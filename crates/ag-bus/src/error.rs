use std::fmt;

#[derive(Debug)]
pub enum Error {
    Store(ag_store::Error),
    SequenceAlreadyStarted(uuid::Uuid),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(e) => write!(f, "persistence error: {e}"),
            Error::SequenceAlreadyStarted(run_id) => {
                write!(f, "sequence for run {run_id} was already started by a prior publish")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => Some(e),
            Error::SequenceAlreadyStarted(_) => None,
        }
    }
}

impl From<ag_store::Error> for Error {
    fn from(e: ag_store::Error) -> Self {
        Error::Store(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
