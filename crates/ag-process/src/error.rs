use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    NotRunning,
    AlreadyTerminated,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "process io error: {e}"),
            Error::NotRunning => write!(f, "controller has no running process"),
            Error::AlreadyTerminated => write!(f, "controller was already terminated"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
