//! Scoped acquisition: a guard that returns its handle to the factory on drop.

use crate::base::neterror::NetError;
use crate::transport::factory::{HandleFactory, SharedHandleFactory};
use crate::transport::handle::RequestHandle;
use crate::transport::multi::MultiHandle;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

mod private {
    pub trait Sealed {}
    impl Sealed for crate::transport::handle::RequestHandle {}
    impl Sealed for crate::transport::multi::MultiHandle {}
}

/// A handle kind a factory knows how to take back.
pub trait Leased: private::Sealed + Sized {
    fn release_to(self, factory: &dyn HandleFactory);
}

impl Leased for RequestHandle {
    fn release_to(self, factory: &dyn HandleFactory) {
        factory.cleanup_handle(self)
    }
}

impl Leased for MultiHandle {
    fn release_to(self, factory: &dyn HandleFactory) {
        factory.cleanup_multi_handle(self)
    }
}

/// Owns a handle on loan from a factory.
///
/// Dropping the lease returns the handle on every exit path, panics and
/// early returns included.
pub struct Lease<H: Leased> {
    factory: SharedHandleFactory,
    handle: Option<H>,
}

impl<H: Leased> Lease<H> {
    pub fn factory(&self) -> &SharedHandleFactory {
        &self.factory
    }

    /// Detach the handle. The caller becomes responsible for returning it.
    pub fn into_inner(mut self) -> H {
        self.handle.take().expect("lease holds its handle until dropped")
    }
}

impl<H: Leased> Deref for Lease<H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.handle.as_ref().expect("lease holds its handle until dropped")
    }
}

impl<H: Leased> DerefMut for Lease<H> {
    fn deref_mut(&mut self) -> &mut H {
        self.handle.as_mut().expect("lease holds its handle until dropped")
    }
}

impl<H: Leased + fmt::Debug> fmt::Debug for Lease<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease").field("handle", &self.handle).finish()
    }
}

impl<H: Leased> Drop for Lease<H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.release_to(&*self.factory);
        }
    }
}

/// Borrow a request handle from `factory` for the lifetime of the guard.
pub fn lease_handle(factory: &SharedHandleFactory) -> Result<Lease<RequestHandle>, NetError> {
    let handle = factory.create_handle()?;
    Ok(Lease { factory: Arc::clone(factory), handle: Some(handle) })
}

/// Borrow a multi handle from `factory` for the lifetime of the guard.
pub fn lease_multi_handle(factory: &SharedHandleFactory) -> Result<Lease<MultiHandle>, NetError> {
    let multi = factory.create_multi_handle()?;
    Ok(Lease { factory: Arc::clone(factory), handle: Some(multi) })
}
