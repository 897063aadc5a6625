// Information-model error types
// Raised while parsing, building, validating or encoding protocol messages

use thiserror::Error;
use crate::{ErrorCode, ErrorDomain, MplaneError};

/// Model error codes
pub mod codes {
    use crate::ErrorCode;

    // Model error codes start with 1000
    pub const INVALID_VALUE: ErrorCode = ErrorCode(1001);
    pub const CONSTRAINT_VIOLATION: ErrorCode = ErrorCode(1002);
    pub const VALIDATION_FAILED: ErrorCode = ErrorCode(1003);
    pub const SCOPE_VIOLATION: ErrorCode = ErrorCode(1004);
    pub const UNKNOWN_PARAMETER: ErrorCode = ErrorCode(1005);

    // Registry error codes start with 1100
    pub const UNKNOWN_ELEMENT: ErrorCode = ErrorCode(1101);
    pub const REGISTRY_FORMAT: ErrorCode = ErrorCode(1102);
    pub const REGISTRY_LOOP: ErrorCode = ErrorCode(1103);
    pub const REGISTRY_LOAD: ErrorCode = ErrorCode(1104);
    pub const REGISTRY_STATE: ErrorCode = ErrorCode(1105);

    // Temporal error codes start with 1200
    pub const INVALID_TIME: ErrorCode = ErrorCode(1201);
    pub const INVALID_DURATION: ErrorCode = ErrorCode(1202);
    pub const INVALID_WHEN: ErrorCode = ErrorCode(1203);
    pub const NOT_REPEATED: ErrorCode = ErrorCode(1204);

    // Codec error codes start with 1300
    pub const VERSION_MISMATCH: ErrorCode = ErrorCode(1301);
    pub const UNKNOWN_MESSAGE: ErrorCode = ErrorCode(1302);
    pub const MALFORMED_MESSAGE: ErrorCode = ErrorCode(1303);
    pub const JSON_ERROR: ErrorCode = ErrorCode(1304);
}

/// Errors raised by the information model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// A string could not be parsed as a value of the element's primitive
    #[error("Invalid {primitive} value: {value}")]
    InvalidValue { primitive: String, value: String },

    /// A parameter value falls outside its constraint
    #[error("Parameter {name} cannot take value {value}")]
    ConstraintViolation { name: String, value: String },

    /// Statement failed kind-specific validation
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A temporal scope does not follow the enclosing scope
    #[error("Cannot set temporal scope {when} within {within}")]
    ScopeViolation { when: String, within: String },

    /// Statement has no parameter or column of that name
    #[error("No such parameter or column: {0}")]
    UnknownParameter(String),

    /// Element missing from every loaded registry
    #[error("Key error: {0} not present in registries")]
    UnknownElement(String),

    /// Registry document is structurally invalid
    #[error("Unsupported registry format: {0}")]
    RegistryFormat(String),

    /// Registry includes itself, directly or transitively
    #[error("Registry include loop at {0}")]
    RegistryLoop(String),

    /// Registry could not be read
    #[error("Invalid registry uri {uri}: {message}")]
    RegistryLoad { uri: String, message: String },

    /// Provider used before initialization, or initialized twice
    #[error("Registry provider state error: {0}")]
    RegistryState(String),

    /// Timestamp string is not an mPlane timestamp
    #[error("{0:?} does not appear to be an mPlane timestamp")]
    InvalidTime(String),

    /// Duration string is not an mPlane duration
    #[error("{0:?} does not appear to be an mPlane duration")]
    InvalidDuration(String),

    /// Temporal scope string is malformed
    #[error("{value:?} does not appear to be an mPlane when ({reason})")]
    InvalidWhen { value: String, reason: String },

    /// Iteration requested on a scope without repetition
    #[error("Can't get iterator for non-repeated when {0}")]
    NotRepeated(String),

    /// Remote peer speaks a newer protocol version
    #[error("Version mismatch: remote version {remote} is newer than local version {local}")]
    VersionMismatch { remote: u64, local: u64 },

    /// No known message kind key present
    #[error("Cannot determine message type from {0}")]
    UnknownMessage(String),

    /// Message object is missing a field or carries the wrong type
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Raw JSON could not be decoded or encoded
    #[error("JSON error: {0}")]
    Json(String),
}

impl MplaneError for ModelError {
    fn code(&self) -> ErrorCode {
        use codes::*;
        match self {
            ModelError::InvalidValue { .. } => INVALID_VALUE,
            ModelError::ConstraintViolation { .. } => CONSTRAINT_VIOLATION,
            ModelError::ValidationFailed(_) => VALIDATION_FAILED,
            ModelError::ScopeViolation { .. } => SCOPE_VIOLATION,
            ModelError::UnknownParameter(_) => UNKNOWN_PARAMETER,
            ModelError::UnknownElement(_) => UNKNOWN_ELEMENT,
            ModelError::RegistryFormat(_) => REGISTRY_FORMAT,
            ModelError::RegistryLoop(_) => REGISTRY_LOOP,
            ModelError::RegistryLoad { .. } => REGISTRY_LOAD,
            ModelError::RegistryState(_) => REGISTRY_STATE,
            ModelError::InvalidTime(_) => INVALID_TIME,
            ModelError::InvalidDuration(_) => INVALID_DURATION,
            ModelError::InvalidWhen { .. } => INVALID_WHEN,
            ModelError::NotRepeated(_) => NOT_REPEATED,
            ModelError::VersionMismatch { .. } => VERSION_MISMATCH,
            ModelError::UnknownMessage(_) => UNKNOWN_MESSAGE,
            ModelError::MalformedMessage(_) => MALFORMED_MESSAGE,
            ModelError::Json(_) => JSON_ERROR,
        }
    }

    fn domain(&self) -> ErrorDomain {
        match self {
            ModelError::UnknownElement(_)
            | ModelError::RegistryFormat(_)
            | ModelError::RegistryLoop(_)
            | ModelError::RegistryLoad { .. }
            | ModelError::RegistryState(_) => ErrorDomain::Registry,
            ModelError::InvalidTime(_)
            | ModelError::InvalidDuration(_)
            | ModelError::InvalidWhen { .. }
            | ModelError::NotRepeated(_) => ErrorDomain::Temporal,
            ModelError::VersionMismatch { .. }
            | ModelError::UnknownMessage(_)
            | ModelError::MalformedMessage(_)
            | ModelError::Json(_) => ErrorDomain::Codec,
            _ => ErrorDomain::Model,
        }
    }
}

impl ModelError {
    pub fn invalid_value(primitive: impl Into<String>, value: impl Into<String>) -> Self {
        ModelError::InvalidValue { primitive: primitive.into(), value: value.into() }
    }

    pub fn constraint_violation(name: impl Into<String>, value: impl Into<String>) -> Self {
        ModelError::ConstraintViolation { name: name.into(), value: value.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ModelError::ValidationFailed(message.into())
    }

    pub fn unknown_element(name: impl Into<String>) -> Self {
        ModelError::UnknownElement(name.into())
    }

    pub fn registry_load(uri: impl Into<String>, message: impl ToString) -> Self {
        ModelError::RegistryLoad { uri: uri.into(), message: message.to_string() }
    }

    pub fn invalid_when(value: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::InvalidWhen { value: value.into(), reason: reason.into() }
    }

    pub fn version_mismatch(remote: u64, local: u64) -> Self {
        ModelError::VersionMismatch { remote, local }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        ModelError::MalformedMessage(message.into())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Json(err.to_string())
    }
}

/// Convert from model error to boxed error
impl From<ModelError> for Box<dyn MplaneError> {
    fn from(err: ModelError) -> Self {
        Box::new(err)
    }
}

/// Convenient Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;
