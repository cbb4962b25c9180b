//! Error types for routing and connection handling.

use std::io;

use mcproxy_protocol::ProtocolError;
use thiserror::Error;

use crate::proxy::Endpoint;

/// Route lookup failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Neither the server address nor the `default` key is in the table.
    #[error("no route for '{server_address}' and no default route")]
    NoRoute { server_address: String },

    /// The route table could not be loaded.
    #[error("route table unavailable: {0}")]
    ConfigUnavailable(String),
}

/// Per-connection failures. None of these stop the accept loop.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The first packet could not be decoded as a handshake.
    #[error("handshake rejected: {0}")]
    Protocol(#[from] ProtocolError),

    /// No backend for the requested server address.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// The resolved backend could not be reached.
    #[error("failed to dial backend {endpoint}: {source}")]
    DialFailure {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    /// IO error on the client or backend socket.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ConnectionError {
    /// Stable label for logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ConnectionError::Protocol(e) => e.reason_code(),
            ConnectionError::Route(RouteError::NoRoute { .. }) => "no_route",
            ConnectionError::Route(RouteError::ConfigUnavailable(_)) => "config_unavailable",
            ConnectionError::DialFailure { .. } => "dial_failure",
            ConnectionError::Io(_) => "io_error",
        }
    }
}
