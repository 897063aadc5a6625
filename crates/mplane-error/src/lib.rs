// mPlane error handling framework
// Shared error domains, codes and the per-crate error enums

use std::error::Error as StdError;
use std::fmt;

// Re-export common error handling tools for convenience
pub use anyhow;
pub use thiserror;

pub mod model;
pub mod scheduler;

pub use model::{ModelError, ModelResult};
pub use scheduler::{SchedulerError, SchedulerResult};

/// Error domains representing the different layers of the protocol stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorDomain {
    Model, Registry, Temporal, Codec, Scheduler, External,
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDomain::Model => write!(f, "model"),
            ErrorDomain::Registry => write!(f, "registry"),
            ErrorDomain::Temporal => write!(f, "temporal"),
            ErrorDomain::Codec => write!(f, "codec"),
            ErrorDomain::Scheduler => write!(f, "scheduler"),
            ErrorDomain::External => write!(f, "external"),
        }
    }
}

/// Error code structure for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ErrorCode(pub u32);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// Standard error message format for serialization
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub domain: ErrorDomain,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Base trait for all errors raised by the mPlane crates.
pub trait MplaneError: StdError + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Numeric code identifying this error.
    fn code(&self) -> ErrorCode;

    /// The layer that raised the error.
    fn domain(&self) -> ErrorDomain;

    /// Render the error in its serializable form.
    fn to_message(&self) -> ErrorMessage {
        ErrorMessage {
            code: self.code(),
            domain: self.domain(),
            message: self.to_string(),
            details: None,
        }
    }
}

/// Shorthand for a boxed MplaneError
pub type BoxError = Box<dyn MplaneError>;
