//! Ergonomic error context helpers.
//!
//! Extension traits that turn I/O and timer failures into context-rich
//! `NetError` variants at the point where the host or domain is known.

use crate::base::neterror::NetError;
use std::io;
use tokio::time::error::Elapsed;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Add connection context to an IO error.
    ///
    /// # Example
    /// ```ignore
    /// use storagenet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(addr).await
    ///     .connection_context("storage.example.com", 443)?;
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Add DNS resolution context to an IO error.
    fn dns_context(self, domain: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| NetError::connection_failed_to(host, port, e))
    }

    fn dns_context(self, domain: &str) -> Result<T, NetError> {
        self.map_err(|e| NetError::dns_failed(domain, e))
    }
}

/// Maps an elapsed `tokio::time::timeout` into a `NetError`.
pub trait TimeoutResultExt<T> {
    /// Elapsed timer becomes `err`; the inner result is flattened.
    fn or_timed_out(self, err: NetError) -> Result<T, NetError>;
}

impl<T> TimeoutResultExt<T> for Result<Result<T, NetError>, Elapsed> {
    fn or_timed_out(self, err: NetError) -> Result<T, NetError> {
        self.unwrap_or(Err(err))
    }
}
