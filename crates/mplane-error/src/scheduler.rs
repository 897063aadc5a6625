// Scheduler error types
// These cover the scheduler's own plumbing; job failures become protocol exceptions

use thiserror::Error;
use crate::{ErrorCode, ErrorDomain, MplaneError, ModelError};

/// Scheduler error codes
pub mod codes {
    use crate::ErrorCode;

    // Scheduler error codes start with 5000
    pub const NO_RUNTIME: ErrorCode = ErrorCode(5001);
    pub const CONFIG_ERROR: ErrorCode = ErrorCode(5002);
    pub const LOGGING_ERROR: ErrorCode = ErrorCode(5003);
    pub const MODEL_ERROR: ErrorCode = ErrorCode(5004);
}

/// Scheduler-specific error types
#[derive(Error, Debug, Clone)]
pub enum SchedulerError {
    /// No async runtime is available to drive timers and workers
    #[error("No runtime available: {0}")]
    NoRuntime(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tracing subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// Model failure while preparing the scheduler
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl MplaneError for SchedulerError {
    fn code(&self) -> ErrorCode {
        use codes::*;
        match self {
            SchedulerError::NoRuntime(_) => NO_RUNTIME,
            SchedulerError::Config(_) => CONFIG_ERROR,
            SchedulerError::Logging(_) => LOGGING_ERROR,
            SchedulerError::Model(_) => MODEL_ERROR,
        }
    }

    fn domain(&self) -> ErrorDomain {
        match self {
            SchedulerError::Model(err) => err.domain(),
            _ => ErrorDomain::Scheduler,
        }
    }
}

impl SchedulerError {
    pub fn no_runtime(message: impl Into<String>) -> Self {
        SchedulerError::NoRuntime(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        SchedulerError::Config(message.into())
    }
}

/// Convert from scheduler error to boxed error
impl From<SchedulerError> for Box<dyn MplaneError> {
    fn from(err: SchedulerError) -> Self {
        Box::new(err)
    }
}

/// Convenient Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
