//! Error types for the Tether library

use std::time::Duration;
use tether_proto::{ProtocolError, Thrown};
use thiserror::Error;

/// Main error type for proxy operations
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The proxy (or the connection it belongs to) was released
    #[error("Proxy has been released and is not useable")]
    Released,

    /// A HANDLER wire value named a handler that is not registered
    #[error("Unknown transfer handler: {0}")]
    UnknownHandler(String),

    /// The remote operation threw; re-raised locally
    #[error("Remote operation failed: {0}")]
    Thrown(Thrown),

    /// A value could neither be handled nor cloned onto the wire
    #[error("Value could not be cloned: {0}")]
    DataClone(String),

    /// The endpoint no longer carries messages
    #[error("Endpoint closed")]
    EndpointClosed,

    /// No reply arrived in time
    #[error("Timeout after {duration:?}")]
    Timeout {
        /// Duration that was exceeded
        duration: Duration,
    },

    /// The reply did not have the expected shape
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Protocol-level errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ProxyError {
    /// The remote failure, if this error re-raises one
    pub fn thrown(&self) -> Option<&Thrown> {
        match self {
            Self::Thrown(thrown) => Some(thrown),
            _ => None,
        }
    }
}

impl From<Thrown> for ProxyError {
    fn from(thrown: Thrown) -> Self {
        Self::Thrown(thrown)
    }
}

impl From<ProxyError> for Thrown {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Thrown(thrown) => thrown,
            ProxyError::DataClone(msg) => Thrown::named("DataCloneError", msg),
            other => Thrown::error(other.to_string()),
        }
    }
}
