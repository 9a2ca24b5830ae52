use crate::base::neterror::NetError;
use crate::transport::factory::{apply_options, HandleFactory};
use crate::transport::handle::RequestHandle;
use crate::transport::multi::MultiHandle;
use crate::transport::options::TransportOptions;
use std::sync::{Mutex, PoisonError};

/// Local IP a released handle last transferred from, if it reported one.
pub(crate) fn observed_client_ip(handle: &RequestHandle) -> Option<String> {
    handle.local_ip().map(|ip| ip.to_string()).filter(|ip| !ip.is_empty())
}

/// Factory that allocates a fresh handle per request and destroys it on return.
#[derive(Debug, Default)]
pub struct DefaultHandleFactory {
    options: TransportOptions,
    last_client_ip_address: Mutex<String>,
}

impl DefaultHandleFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: TransportOptions) -> Self {
        Self { options, last_client_ip_address: Mutex::new(String::new()) }
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Local IP of the most recent transfer returned to this factory.
    ///
    /// Empty until a handle that completed a transfer is returned.
    pub fn last_client_ip_address(&self) -> String {
        self.last_client_ip_address.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl HandleFactory for DefaultHandleFactory {
    fn create_handle(&self) -> Result<RequestHandle, NetError> {
        let mut handle = RequestHandle::init()?;
        apply_options(&mut handle, &self.options);
        Ok(handle)
    }

    fn cleanup_handle(&self, handle: RequestHandle) {
        if let Some(ip) = observed_client_ip(&handle) {
            tracing::trace!(handle = %handle.id(), ip = %ip, "recorded client IP");
            *self.last_client_ip_address.lock().unwrap_or_else(PoisonError::into_inner) = ip;
        }
        drop(handle);
    }

    fn create_multi_handle(&self) -> Result<MultiHandle, NetError> {
        Ok(MultiHandle::new())
    }

    fn cleanup_multi_handle(&self, multi: MultiHandle) {
        drop(multi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::options::{TlsContextCallback, TlsContextData};

    #[test]
    fn test_every_handle_is_fresh() {
        let factory = DefaultHandleFactory::new();
        let a = factory.create_handle().unwrap();
        let a_id = a.id();
        factory.cleanup_handle(a);

        let b = factory.create_handle().unwrap();
        assert_ne!(b.id(), a_id);
    }

    #[test]
    fn test_options_applied_to_created_handles() {
        let callback = TlsContextCallback::new(|_, _| Ok(()));
        let options = TransportOptions::builder()
            .tls_context_callback(callback.clone())
            .tls_context_data(TlsContextData::new(()))
            .build();
        let factory = DefaultHandleFactory::with_options(options);

        let handle = factory.create_handle().unwrap();
        assert!(handle.tls_context_callback().unwrap().ptr_eq(&callback));
        assert!(handle.tls_context_data().is_some());
    }

    #[test]
    fn test_release_without_transfer_keeps_ip_empty() {
        let factory = DefaultHandleFactory::new();
        let handle = factory.create_handle().unwrap();
        factory.cleanup_handle(handle);
        assert!(factory.last_client_ip_address().is_empty());
    }

    #[test]
    fn test_multi_handles_are_not_reused() {
        let factory = DefaultHandleFactory::new();
        let m = factory.create_multi_handle().unwrap();
        let m_id = m.id();
        factory.cleanup_multi_handle(m);
        assert_ne!(factory.create_multi_handle().unwrap().id(), m_id);
    }
}
