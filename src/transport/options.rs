//! Transport options applied to every handle a factory produces.
//!
//! The only customization point is the TLS context: a callback that receives
//! the connector builder before each TLS connection is configured, plus an
//! opaque shared blob handed to that callback.

use crate::base::neterror::NetError;
use boring::error::ErrorStack;
use boring::ssl::SslConnectorBuilder;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

type TlsContextFn =
    dyn Fn(&mut SslConnectorBuilder, Option<&TlsContextData>) -> Result<(), ErrorStack>
        + Send
        + Sync;

/// Callback invoked with the TLS connector builder of a handle.
///
/// Cloning shares the same callback; two clones compare equal under
/// [`TlsContextCallback::ptr_eq`].
#[derive(Clone)]
pub struct TlsContextCallback(Arc<TlsContextFn>);

impl TlsContextCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut SslConnectorBuilder, Option<&TlsContextData>) -> Result<(), ErrorStack>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }

    /// Whether both values refer to the same callback.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    /// Run the callback against a connector builder.
    pub fn invoke(
        &self,
        builder: &mut SslConnectorBuilder,
        data: Option<&TlsContextData>,
    ) -> Result<(), NetError> {
        (self.0)(builder, data).map_err(|e| {
            tracing::debug!(error = %e, "TLS context callback failed");
            NetError::SslProtocolError
        })
    }
}

impl fmt::Debug for TlsContextCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TlsContextCallback").field(&Arc::as_ptr(&self.0)).finish()
    }
}

/// Opaque user data for the TLS context callback.
///
/// Ownership is shared: every options value and every handle holding the
/// blob keeps it alive.
#[derive(Clone)]
pub struct TlsContextData(Arc<dyn Any + Send + Sync>);

impl TlsContextData {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether both values refer to the same blob.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for TlsContextData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TlsContextData").field(&Arc::as_ptr(&self.0)).finish()
    }
}

/// Builder for `TransportOptions`.
#[must_use]
#[derive(Debug, Clone, Default)]
pub struct TransportOptionsBuilder {
    config: TransportOptions,
}

/// Transport configuration shared by every handle of a factory.
///
/// No validation happens here: data without a callback is accepted, it is
/// simply never applied to a handle.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    tls_context_callback: Option<TlsContextCallback>,
    tls_context_data: Option<TlsContextData>,
}

impl TransportOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tls_context_callback(mut self, callback: TlsContextCallback) -> Self {
        self.config.tls_context_callback = Some(callback);
        self
    }

    pub fn tls_context_data(mut self, data: TlsContextData) -> Self {
        self.config.tls_context_data = Some(data);
        self
    }

    pub fn build(self) -> TransportOptions {
        self.config
    }
}

impl TransportOptions {
    /// Options with no TLS customization.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> TransportOptionsBuilder {
        TransportOptionsBuilder::new()
    }

    pub fn tls_context_callback(&self) -> Option<&TlsContextCallback> {
        self.tls_context_callback.as_ref()
    }

    pub fn tls_context_data(&self) -> Option<&TlsContextData> {
        self.tls_context_data.as_ref()
    }

    /// Replace the TLS context callback.
    pub fn set_tls_context_callback(&mut self, callback: TlsContextCallback) -> &mut Self {
        self.tls_context_callback = Some(callback);
        self
    }

    /// Replace the TLS context data blob.
    pub fn set_tls_context_data(&mut self, data: TlsContextData) -> &mut Self {
        self.tls_context_data = Some(data);
        self
    }

    /// True when a TLS context callback is installed.
    pub fn has_tls_customization(&self) -> bool {
        self.tls_context_callback.is_some()
    }
}
