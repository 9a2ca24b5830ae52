use crate::base::neterror::NetError;
use crate::transport::default::observed_client_ip;
use crate::transport::factory::{apply_options, HandleFactory};
use crate::transport::handle::RequestHandle;
use crate::transport::multi::MultiHandle;
use crate::transport::options::TransportOptions;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Released handles waiting for reuse, oldest at the front.
#[derive(Default)]
struct PoolState {
    handles: VecDeque<RequestHandle>,
    multi_handles: VecDeque<MultiHandle>,
    last_client_ip_address: String,
}

/// Push `item` onto a bounded pool, evicting the oldest entry when full.
///
/// Returns what has to be destroyed: the evicted entry, or `item` itself
/// when the pool has no capacity at all.
fn push_bounded<T>(pool: &mut VecDeque<T>, maximum_size: usize, item: T) -> Option<T> {
    if maximum_size == 0 {
        return Some(item);
    }
    let evicted = if pool.len() >= maximum_size { pool.pop_front() } else { None };
    pool.push_back(item);
    evicted
}

/// Factory that keeps up to `maximum_size` released handles for reuse.
///
/// Reuse takes the most recently released handle (LIFO), eviction drops the
/// oldest one (FIFO). Request handles and multi handles are pooled
/// separately, each bounded by `maximum_size`.
pub struct PooledHandleFactory {
    maximum_size: usize,
    options: TransportOptions,
    state: Mutex<PoolState>,
}

impl fmt::Debug for PooledHandleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("PooledHandleFactory")
            .field("maximum_size", &self.maximum_size)
            .field("options", &self.options)
            .field("idle_handles", &state.handles.len())
            .field("idle_multi_handles", &state.multi_handles.len())
            .finish()
    }
}

impl PooledHandleFactory {
    pub fn new(maximum_size: usize, options: TransportOptions) -> Self {
        Self {
            maximum_size,
            options,
            state: Mutex::new(PoolState {
                handles: VecDeque::with_capacity(maximum_size),
                multi_handles: VecDeque::with_capacity(maximum_size),
                last_client_ip_address: String::new(),
            }),
        }
    }

    /// Pool without TLS customization.
    pub fn with_maximum_size(maximum_size: usize) -> Self {
        Self::new(maximum_size, TransportOptions::default())
    }

    // Every critical section leaves the pools consistent, so a poisoned
    // lock is still usable.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn maximum_size(&self) -> usize {
        self.maximum_size
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Number of request handles waiting for reuse.
    pub fn idle_handle_count(&self) -> usize {
        self.lock().handles.len()
    }

    /// Number of multi handles waiting for reuse.
    pub fn idle_multi_handle_count(&self) -> usize {
        self.lock().multi_handles.len()
    }

    /// Local IP of the most recent transfer returned to this factory.
    pub fn last_client_ip_address(&self) -> String {
        self.lock().last_client_ip_address.clone()
    }
}

impl HandleFactory for PooledHandleFactory {
    fn create_handle(&self) -> Result<RequestHandle, NetError> {
        let pooled = self.lock().handles.pop_back();

        // The handle is no longer visible to the pool; configure it unlocked.
        let mut handle = match pooled {
            Some(mut handle) => {
                tracing::debug!(handle = %handle.id(), "reusing pooled handle");
                handle.reset();
                handle
            }
            None => RequestHandle::init()?,
        };
        apply_options(&mut handle, &self.options);
        Ok(handle)
    }

    fn cleanup_handle(&self, handle: RequestHandle) {
        let ip = observed_client_ip(&handle);
        let id = handle.id();

        let destroyed = {
            let mut state = self.lock();
            debug_assert!(
                state.handles.iter().all(|h| h.id() != id),
                "handle {} released twice",
                id
            );
            if let Some(ip) = ip {
                tracing::trace!(handle = %id, ip = %ip, "recorded client IP");
                state.last_client_ip_address = ip;
            }
            push_bounded(&mut state.handles, self.maximum_size, handle)
        };

        if let Some(handle) = destroyed {
            tracing::debug!(handle = %handle.id(), returned = %id, "evicting handle from full pool");
        }
    }

    fn create_multi_handle(&self) -> Result<MultiHandle, NetError> {
        let pooled = self.lock().multi_handles.pop_back();
        if let Some(multi) = pooled {
            tracing::debug!(multi = %multi.id(), "reusing pooled multi handle");
            return Ok(multi);
        }
        Ok(MultiHandle::new())
    }

    fn cleanup_multi_handle(&self, mut multi: MultiHandle) {
        if !multi.is_empty() {
            tracing::warn!(
                multi = %multi.id(),
                running = multi.running(),
                "multi handle returned with transfers in flight"
            );
            multi.clear();
        }
        let id = multi.id();

        let destroyed = {
            let mut state = self.lock();
            debug_assert!(
                state.multi_handles.iter().all(|m| m.id() != id),
                "multi handle {} released twice",
                id
            );
            push_bounded(&mut state.multi_handles, self.maximum_size, multi)
        };

        if let Some(multi) = destroyed {
            tracing::debug!(multi = %multi.id(), returned = %id, "evicting multi handle from full pool");
        }
    }
}

impl Drop for PooledHandleFactory {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(
            handles = state.handles.len(),
            multi_handles = state.multi_handles.len(),
            "destroying pooled handles"
        );
        state.handles.clear();
        state.multi_handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::handle::HandleId;
    use crate::transport::options::{TlsContextCallback, TlsContextData};
    use http::header::{HeaderName, HeaderValue};
    use http::Method;
    use std::sync::Arc;
    use std::time::Duration;
    use url::Url;

    fn pooled_ids(factory: &PooledHandleFactory) -> Vec<HandleId> {
        factory.lock().handles.iter().map(RequestHandle::id).collect()
    }

    fn pooled_multi_ids(factory: &PooledHandleFactory) -> Vec<HandleId> {
        factory.lock().multi_handles.iter().map(MultiHandle::id).collect()
    }

    #[test]
    fn test_push_bounded() {
        let mut pool = VecDeque::new();
        assert_eq!(push_bounded(&mut pool, 2, 1), None);
        assert_eq!(push_bounded(&mut pool, 2, 2), None);
        assert_eq!(push_bounded(&mut pool, 2, 3), Some(1));
        assert_eq!(pool, [2, 3]);
        assert_eq!(push_bounded(&mut pool, 0, 4), Some(4));
        assert_eq!(pool, [2, 3]);
    }

    #[test]
    fn test_fifo_eviction_lifo_reuse() {
        let factory = PooledHandleFactory::with_maximum_size(2);
        let a = factory.create_handle().unwrap();
        let b = factory.create_handle().unwrap();
        let c = factory.create_handle().unwrap();
        let (a_id, b_id, c_id) = (a.id(), b.id(), c.id());
        assert_eq!(factory.idle_handle_count(), 0);

        factory.cleanup_handle(a);
        factory.cleanup_handle(b);
        assert_eq!(pooled_ids(&factory), vec![a_id, b_id]);

        factory.cleanup_handle(c);
        assert_eq!(pooled_ids(&factory), vec![b_id, c_id]);

        let reused = factory.create_handle().unwrap();
        assert_eq!(reused.id(), c_id);
        assert_eq!(pooled_ids(&factory), vec![b_id]);
    }

    #[test]
    fn test_pool_never_exceeds_maximum() {
        let factory = PooledHandleFactory::with_maximum_size(3);
        let mut live = Vec::new();
        for round in 0..50 {
            if round % 3 == 2 {
                for h in live.drain(..) {
                    factory.cleanup_handle(h);
                    assert!(factory.idle_handle_count() <= 3);
                }
            } else {
                for _ in 0..(round % 5 + 1) {
                    live.push(factory.create_handle().unwrap());
                }
            }
        }
        assert!(factory.idle_handle_count() <= 3);
    }

    #[test]
    fn test_zero_capacity_destroys_every_release() {
        let factory = PooledHandleFactory::with_maximum_size(0);
        let a = factory.create_handle().unwrap();
        let a_id = a.id();
        factory.cleanup_handle(a);
        assert_eq!(factory.idle_handle_count(), 0);

        let b = factory.create_handle().unwrap();
        assert_ne!(b.id(), a_id);
        factory.cleanup_handle(b);
        assert_eq!(factory.idle_handle_count(), 0);

        let m = factory.create_multi_handle().unwrap();
        factory.cleanup_multi_handle(m);
        assert_eq!(factory.idle_multi_handle_count(), 0);
    }

    #[test]
    fn test_reused_handle_matches_fresh_one() {
        let callback = TlsContextCallback::new(|_, _| Ok(()));
        let data = TlsContextData::new(String::from("ctx"));
        let options = TransportOptions::builder()
            .tls_context_callback(callback.clone())
            .tls_context_data(data.clone())
            .build();
        let factory = PooledHandleFactory::new(4, options);

        let mut used = factory.create_handle().unwrap();
        used.set_method(Method::DELETE)
            .set_url(Url::parse("http://127.0.0.1/b/old").unwrap())
            .append_header(HeaderName::from_static("x-upload"), HeaderValue::from_static("1"))
            .set_body("leftover")
            .set_timeout(Duration::from_millis(5))
            .set_tls_context_callback(TlsContextCallback::new(|_, _| Ok(())));
        let used_id = used.id();
        factory.cleanup_handle(used);

        let reused = factory.create_handle().unwrap();
        let fresh = factory.create_handle().unwrap();
        assert_eq!(reused.id(), used_id);

        for handle in [&reused, &fresh] {
            assert_eq!(*handle.method(), Method::GET);
            assert!(handle.url().is_none());
            assert!(handle.headers().is_empty());
            assert!(handle.body().is_empty());
            assert!(handle.timeout().is_none());
            assert!(handle.tls_context_callback().unwrap().ptr_eq(&callback));
            assert!(handle.tls_context_data().unwrap().ptr_eq(&data));
        }
        assert_eq!(reused.info(), fresh.info());
    }

    #[test]
    fn test_multi_pool_is_separate() {
        let factory = PooledHandleFactory::with_maximum_size(1);
        let h = factory.create_handle().unwrap();
        let m1 = factory.create_multi_handle().unwrap();
        let m2 = factory.create_multi_handle().unwrap();
        let m2_id = m2.id();

        factory.cleanup_handle(h);
        factory.cleanup_multi_handle(m1);
        factory.cleanup_multi_handle(m2);

        assert_eq!(factory.idle_handle_count(), 1);
        assert_eq!(pooled_multi_ids(&factory), vec![m2_id]);
        assert_eq!(factory.create_multi_handle().unwrap().id(), m2_id);
    }

    #[test]
    fn test_pooled_multi_handle_is_cleared() {
        let factory = PooledHandleFactory::with_maximum_size(2);
        let mut multi = factory.create_multi_handle().unwrap();
        multi.add(factory.create_handle().unwrap());
        assert_eq!(multi.running(), 1);

        factory.cleanup_multi_handle(multi);
        let multi = factory.create_multi_handle().unwrap();
        assert!(multi.is_empty());
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let factory = Arc::new(PooledHandleFactory::with_maximum_size(4));
        std::thread::scope(|s| {
            for _ in 0..8 {
                let factory = Arc::clone(&factory);
                s.spawn(move || {
                    for _ in 0..100 {
                        let h = factory.create_handle().unwrap();
                        let m = factory.create_multi_handle().unwrap();
                        factory.cleanup_handle(h);
                        factory.cleanup_multi_handle(m);
                        assert!(factory.idle_handle_count() <= 4);
                    }
                });
            }
        });
        assert!(factory.idle_handle_count() <= 4);
        assert!(factory.idle_multi_handle_count() <= 4);
        let ids = pooled_ids(&factory);
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(ids.len(), unique.len());
    }
}
