//! Errors crossing the connection capability boundary

use std::time::Duration;
use thiserror::Error;

pub use cnxman_shared::TransitionError;

/// A failed connect attempt, as seen by the manager.
///
/// Every variant is recoverable; the manager logs it and schedules a retry.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("connect attempt raised an error: {0:#}")]
    Wrapped(#[source] anyhow::Error),

    #[error("connect attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("no connection bound to the manager")]
    Unbound,
}

impl From<anyhow::Error> for ConnectError {
    fn from(err: anyhow::Error) -> Self {
        ConnectError::Wrapped(err)
    }
}

/// Which compensating step of a teardown failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    Disconnect,
    Teardown,
}

impl std::fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeardownStep::Disconnect => write!(f, "disconnect"),
            TeardownStep::Teardown => write!(f, "teardown"),
        }
    }
}

/// A transport failure while releasing resources. Logged, never fatal.
#[derive(Error, Debug)]
#[error("transport {step} failed: {source:#}")]
pub struct TeardownError {
    pub step: TeardownStep,
    #[source]
    pub source: anyhow::Error,
}
