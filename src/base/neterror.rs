use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum NetError {
    // Resource Errors
    #[error("Failed to allocate transport handle")]
    HandleAllocationFailed,
    #[error("Failed to allocate multi-transfer handle")]
    MultiHandleAllocationFailed,

    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Connection to {host}:{port} failed: {source}")]
    ConnectionFailedTo {
        host: String,
        port: u16,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("Could not resolve {domain}: {source}")]
    NameNotResolvedFor {
        domain: String,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Operation timed out")]
    TimedOut,
    #[error("SSL protocol error")]
    SslProtocolError,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Unknown URL scheme")]
    UnknownUrlScheme,
    #[error("Invalid HTTP response")]
    InvalidHttpResponse,
    #[error("Empty response")]
    EmptyResponse,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    /// Create a connection error with host/port context.
    pub fn connection_failed_to(host: &str, port: u16, source: std::io::Error) -> Self {
        NetError::ConnectionFailedTo {
            host: host.to_string(),
            port,
            source: Arc::new(source),
        }
    }

    /// Create a DNS error with domain context.
    pub fn dns_failed(domain: &str, source: std::io::Error) -> Self {
        NetError::NameNotResolvedFor {
            domain: domain.to_string(),
            source: Arc::new(source),
        }
    }

    /// Whether the error means the transport layer cannot proceed at all.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NetError::HandleAllocationFailed | NetError::MultiHandleAllocationFailed)
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::TimedOut => -7,
            NetError::MultiHandleAllocationFailed => -12,
            NetError::HandleAllocationFailed => -13,
            NetError::ConnectionClosed => -100,
            NetError::ConnectionFailed | NetError::ConnectionFailedTo { .. } => -104,
            NetError::NameNotResolvedFor { .. } => -105,
            NetError::SslProtocolError => -107,
            NetError::ConnectionTimedOut => -118,
            NetError::InvalidUrl => -300,
            NetError::UnknownUrlScheme => -302,
            NetError::EmptyResponse => -324,
            NetError::InvalidHttpResponse => -370,
            NetError::Unknown(code) => *code,
        }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -7 => NetError::TimedOut,
            -12 => NetError::MultiHandleAllocationFailed,
            -13 => NetError::HandleAllocationFailed,
            -100 => NetError::ConnectionClosed,
            -104 => NetError::ConnectionFailed,
            -107 => NetError::SslProtocolError,
            -118 => NetError::ConnectionTimedOut,
            -300 => NetError::InvalidUrl,
            -302 => NetError::UnknownUrlScheme,
            -324 => NetError::EmptyResponse,
            -370 => NetError::InvalidHttpResponse,
            other => NetError::Unknown(other),
        }
    }
}
