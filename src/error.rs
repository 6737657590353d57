// Error taxonomy for hooked engine calls
use thiserror::Error;

use crate::filter::error::FilterError;
use crate::types::{Operation, Phase};

/// Errors raised by the persistence engine itself
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Errors raised by hook callbacks
#[derive(Debug, Error)]
pub enum HookError {
    #[error("Hook rejected operation: {0}")]
    Rejected(String),

    #[error("Engine error in hook: {0}")]
    Engine(#[from] EngineError),

    #[error("Hook task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HookError {
    pub fn rejected(message: impl Into<String>) -> Self {
        HookError::Rejected(message.into())
    }
}

/// Errors returned to the caller of a hooked operation
///
/// Only before-hook aborts and engine failures are part of a mutation's
/// result. Failures of detached phases never show up here; see
/// [`ObservationError`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("{model}.{operation} aborted by before hook: {source}")]
    Abort {
        model: String,
        operation: Operation,
        #[source]
        source: HookError,
    },

    #[error(transparent)]
    Execution(#[from] EngineError),

    #[error("Invalid query: {0}")]
    Query(#[from] FilterError),

    #[error("Unknown model: {0}")]
    UnknownModel(String),
}

impl Error {
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Abort { .. })
    }

    /// The hook error behind an abort, if any
    pub fn abort_source(&self) -> Option<&HookError> {
        match self {
            Error::Abort { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A failure from a detached phase, handed to the configured reporter
#[derive(Debug, Error)]
#[error("{phase} hook for {model}.{operation} failed: {error}")]
pub struct ObservationError {
    pub model: String,
    pub operation: Operation,
    pub phase: Phase,
    pub column: Option<String>,
    #[source]
    pub error: HookError,
}

impl ObservationError {
    pub fn new(model: &str, operation: Operation, phase: Phase, error: HookError) -> Self {
        Self {
            model: model.to_string(),
            operation,
            phase,
            column: None,
            error,
        }
    }

    pub fn with_column(mut self, column: &str) -> Self {
        self.column = Some(column.to_string());
        self
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
