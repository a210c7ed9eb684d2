//! Error types for the serial link and the reader protocol built on it.
//!
//! Open-time failures are split by cause so that a caller can tell a port
//! that will come back ([`LinkError::is_retryable`]) from one that is
//! misconfigured.

use proxgate_protocol::DecodeError;

/// Result type alias for link operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors raised by a [`DeviceLink`](crate::traits::DeviceLink).
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The named port does not exist.
    #[error("Port not found: {port}")]
    PortNotFound { port: String },

    /// The port exists but another process holds it.
    #[error("Port busy: {port}: {message}")]
    PortBusy { port: String, message: String },

    /// The process may not open the port.
    #[error("Permission denied: {port}")]
    PermissionDenied { port: String },

    /// The port rejected a line setting (baud rate, framing).
    #[error("Unsupported parameter on {port}: {message}")]
    UnsupportedParameter { port: String, message: String },

    /// `send` was called with nothing to send.
    #[error("Refusing to send an empty buffer")]
    EmptyWrite,

    /// The device went away while open.
    #[error("Device disconnected: {port}")]
    Disconnected { port: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Create a new port-not-found error.
    pub fn port_not_found(port: impl Into<String>) -> Self {
        Self::PortNotFound { port: port.into() }
    }

    /// Create a new port-busy error.
    pub fn port_busy(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PortBusy {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create a new unsupported-parameter error.
    pub fn unsupported(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedParameter {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(port: impl Into<String>) -> Self {
        Self::Disconnected { port: port.into() }
    }

    /// Classify an error reported by the `serialport` crate for `port`.
    pub fn from_serial(port: &str, error: serialport::Error) -> Self {
        use serialport::ErrorKind;
        use std::io::ErrorKind as IoKind;

        match error.kind() {
            ErrorKind::NoDevice => Self::port_busy(port, error.description),
            ErrorKind::InvalidInput => Self::unsupported(port, error.description),
            ErrorKind::Io(IoKind::NotFound) => Self::port_not_found(port),
            ErrorKind::Io(IoKind::PermissionDenied) => Self::PermissionDenied {
                port: port.to_string(),
            },
            ErrorKind::Io(IoKind::ResourceBusy) => Self::port_busy(port, error.description),
            ErrorKind::Io(kind) => Self::Io(std::io::Error::new(kind, error.description)),
            _ => Self::Io(std::io::Error::other(error.description)),
        }
    }

    /// Whether the same operation may succeed later without a config change.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PortBusy { .. } | Self::Disconnected { .. } | Self::Io(_)
        )
    }
}

/// Errors raised by [`CardReader`](crate::reader::CardReader).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("can't parse card data: {0}")]
    Decode(#[from] DecodeError),
}
