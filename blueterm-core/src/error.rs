//! Error taxonomy.
//!
//! Every failure here is recoverable: the shell reports it on one line and
//! the command loop continues in whatever state preceded the operation.

use thiserror::Error;

/// Opaque failure from the transport layer.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failures of session operations, distinguishable per cause.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Scan failed; the previously cached device list is left untouched.
    #[error("scan failed: {0}")]
    Scan(TransportError),

    /// Connect or service discovery failed; the session stays idle and the
    /// registry stays empty.
    #[error("connect failed: {0}")]
    Connect(TransportError),

    #[error("read failed: {0}")]
    Read(TransportError),

    #[error("write failed: {0}")]
    Write(TransportError),

    /// The handle is not in the current connection's registry. Also raised
    /// while idle, where the registry is empty by invariant.
    #[error("no characteristic with handle {0}")]
    UnknownHandle(u16),

    #[error("characteristic {0} is not readable")]
    NotReadable(u16),

    /// Read payload is not valid UTF-8; the raw bytes stay available via
    /// [`std::string::FromUtf8Error::as_bytes`].
    #[error("value is not valid UTF-8")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("already connected to {0}")]
    AlreadyConnected(String),

    #[error("device index {index} out of range ({count} devices known)")]
    DeviceIndex { index: usize, count: usize },
}
