use crate::kind::{Phase, TestKind};

/// Crate-wide error type. Every fallible library call returns `Result<T, DrillError>`.
#[derive(Debug, thiserror::Error)]
pub enum DrillError {
    #[error("no stimuli available for {0}")]
    EmptyPool(TestKind),

    #[error("invalid test configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot {action} while {from}")]
    InvalidTransition { from: String, action: &'static str },

    #[error("{kind} does not allow submitting during the {phase} phase")]
    SubmitNotAllowed { kind: TestKind, phase: Phase },

    #[error("{0} responses are written offline and are not collected")]
    ResponseNotAccepted(TestKind),

    #[error("response is empty")]
    EmptyResponse,

    #[error("option {index} is out of range for a question with {options} options")]
    InvalidChoice { index: usize, options: usize },

    #[error("unknown stimulus: {0}")]
    UnknownStimulus(String),

    #[error("blob store error: {0}")]
    Blob(String),

    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("completion log error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, DrillError>;

/// Non-fatal: fewer stimuli than requested. The session runs with `available`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsufficientPool {
    pub requested: usize,
    pub available: usize,
}

impl std::fmt::Display for InsufficientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "only {} of the requested {} stimuli are available",
            self.available, self.requested
        )
    }
}

/// An attempt record that could not be written. The session stays completed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("saving attempt failed after {attempts} tries: {reason}")]
pub struct PersistFailure {
    pub attempts: u32,
    pub reason: String,
}
