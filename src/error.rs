//! Unified engine error type and wire codes.
//!
//! Every failure the tool layer can report maps to one stable code here;
//! the JSON envelope is `{error_message, error_code}`.

use crate::port::PortError;
use thiserror::Error;

/// A specialized `Result` for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// The single error type crossing the engine boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Port not openable, disappeared, or closed when an operation needs it
    /// open.
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed payload: bad hex literal, unknown encoding selector, or an
    /// empty payload where the wait policy needs one.
    #[error("data error: {0}")]
    Data(String),

    /// Reserved for callers that treat timeout expiry as a failure. The
    /// engine itself reports keyword timeouts as a successful outcome with
    /// `found_stop_pattern = false`.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A required argument for the chosen wait policy is missing or out of
    /// range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Internal invariant violation (queue overflow, poisoned state).
    #[error("internal error: {0}")]
    System(String),
}

impl EngineError {
    /// Stable machine-readable code for the tool envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Data(_) => "DATA_ERROR",
            Self::Timeout(_) => "TIMEOUT_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT_ERROR",
            Self::System(_) => "SYSTEM_ERROR",
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::System(message.into())
    }
}

/// Port failures collapse into a single connectivity fault.
impl From<PortError> for EngineError {
    fn from(err: PortError) -> Self {
        Self::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::connection("x").code(), "CONNECTION_ERROR");
        assert_eq!(EngineError::data("x").code(), "DATA_ERROR");
        assert_eq!(EngineError::Timeout("x".into()).code(), "TIMEOUT_ERROR");
        assert_eq!(EngineError::invalid_input("x").code(), "INVALID_INPUT_ERROR");
        assert_eq!(EngineError::system("x").code(), "SYSTEM_ERROR");
    }

    #[test]
    fn port_errors_become_connection_errors() {
        let err: EngineError = PortError::not_found("COM9").into();
        assert_eq!(err.code(), "CONNECTION_ERROR");
        assert!(err.to_string().contains("COM9"));
    }
}
