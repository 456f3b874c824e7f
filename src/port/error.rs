//! Port-level error types.
//!
//! Failures at the OS/serial layer are kept separate from the engine's error
//! taxonomy; the engine folds them into a single connectivity fault.

use thiserror::Error;

/// Errors that can occur while opening or driving a serial link.
#[derive(Debug, Error)]
pub enum PortError {
    /// The named device does not exist on this system.
    #[error("serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during a read or write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested line parameters were rejected.
    #[error("port configuration error: {0}")]
    Config(String),

    /// The operation did not complete within the configured window.
    #[error("port operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// An error surfaced by the underlying serialport implementation.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for the "no data arrived within the read window" family of
    /// errors. The reader loop treats these as an empty poll, not a fault.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn display_messages() {
        let err = PortError::not_found("/dev/ttyUSB7");
        assert_eq!(err.to_string(), "serial port not found: /dev/ttyUSB7");

        let err = PortError::config("unsupported baud");
        assert_eq!(err.to_string(), "port configuration error: unsupported baud");
    }

    #[test]
    fn timeouts_are_transient() {
        assert!(PortError::Timeout(Duration::from_millis(20)).is_transient());
        let io = PortError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "t"));
        assert!(io.is_transient());
        let hard = PortError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(!hard.is_transient());
    }
}
