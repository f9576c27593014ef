//! Error types for adapter sessions
//!
//! Remote failures keep the operation and target that produced them, so the
//! CLI can print them as-is and the TUI can put them on its status line.

use thiserror::Error;

use crate::transport::{CallError, TransportError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The bus connection could not be obtained or released
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A remote method call failed
    #[error("{operation} failed for {target}: {source}")]
    Protocol {
        operation: &'static str,
        target: String,
        #[source]
        source: CallError,
    },

    /// Rejected before any remote call was made
    #[error("{0}")]
    Precondition(&'static str),

    /// The operation needs cached state that is not there
    #[error("{0}")]
    NotFound(String),

    #[error("discovery cancelled")]
    Cancelled,

    #[error("adapter session is closed")]
    Closed,

    /// A primary failure together with a failed cleanup step
    #[error("{}", join_messages(.0))]
    Joined(Vec<Error>),
}

/// Flat classification of [`Error`] for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Precondition,
    NotFound,
    Cancelled,
    Closed,
    Joined,
}

impl Error {
    pub(crate) fn protocol(operation: &'static str, target: impl Into<String>, source: CallError) -> Self {
        Error::Protocol {
            operation,
            target: target.into(),
            source,
        }
    }

    /// Combines an optional primary error with an optional cleanup error.
    pub(crate) fn join(primary: Option<Error>, cleanup: Option<Error>) -> Option<Error> {
        match (primary, cleanup) {
            (None, None) => None,
            (Some(e), None) | (None, Some(e)) => Some(e),
            (Some(Error::Joined(mut errors)), Some(c)) => {
                errors.push(c);
                Some(Error::Joined(errors))
            }
            (Some(p), Some(c)) => Some(Error::Joined(vec![p, c])),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::Protocol { .. } => ErrorKind::Protocol,
            Error::Precondition(_) => ErrorKind::Precondition,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Closed => ErrorKind::Closed,
            Error::Joined(_) => ErrorKind::Joined,
        }
    }

    /// Errors wrapped by a [`Error::Joined`], or the error itself otherwise.
    pub fn errors(&self) -> Vec<&Error> {
        match self {
            Error::Joined(errors) => errors.iter().collect(),
            other => vec![other],
        }
    }
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// BlueZ reports pairing with an already paired device as a failure.
///
/// The structured error name is checked first; the message match covers
/// transports that only surface the text.
pub fn is_already_paired(err: &CallError) -> bool {
    err.name.as_deref() == Some("org.bluez.Error.AlreadyExists") || err.message.contains("Already Exists")
}
