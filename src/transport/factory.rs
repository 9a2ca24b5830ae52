//! The handle factory capability and the process-wide default factory.

use crate::base::neterror::NetError;
use crate::transport::default::DefaultHandleFactory;
use crate::transport::handle::RequestHandle;
use crate::transport::multi::MultiHandle;
use crate::transport::options::TransportOptions;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Creates, configures and retires transport handles.
///
/// A handle must go back to the factory it came from. Whether it is
/// destroyed or kept for reuse is the factory's business.
pub trait HandleFactory: Send + Sync + fmt::Debug {
    /// Obtain a handle with the factory's options applied.
    fn create_handle(&self) -> Result<RequestHandle, NetError>;

    /// Take back a handle the caller is done with.
    fn cleanup_handle(&self, handle: RequestHandle);

    fn create_multi_handle(&self) -> Result<MultiHandle, NetError>;

    fn cleanup_multi_handle(&self, multi: MultiHandle);
}

/// Factory shared between request threads.
pub type SharedHandleFactory = Arc<dyn HandleFactory>;

/// Apply transport options to a handle.
///
/// The callback is installed when present. The data blob is installed when
/// present and a callback is installed as well; on its own it has nothing to
/// be handed to.
pub fn apply_options(handle: &mut RequestHandle, options: &TransportOptions) {
    if let Some(callback) = options.tls_context_callback() {
        handle.set_tls_context_callback(callback.clone());
        if let Some(data) = options.tls_context_data() {
            handle.set_tls_context_data(data.clone());
        }
    }
}

static DEFAULT_FACTORY: LazyLock<Arc<DefaultHandleFactory>> = LazyLock::new(|| {
    tracing::debug!("initializing process-wide default handle factory");
    Arc::new(DefaultHandleFactory::new())
});

/// The process-wide default factory, created on first use.
pub fn default_handle_factory() -> SharedHandleFactory {
    let factory: Arc<DefaultHandleFactory> = Arc::clone(&*DEFAULT_FACTORY);
    factory
}

/// Default factory for the given options.
///
/// With a TLS callback installed a new, uncached factory is returned every
/// time; otherwise this is [`default_handle_factory`].
pub fn default_handle_factory_with(options: &TransportOptions) -> SharedHandleFactory {
    if options.has_tls_customization() {
        return Arc::new(DefaultHandleFactory::with_options(options.clone()));
    }
    default_handle_factory()
}
