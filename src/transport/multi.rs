//! Multi-transfer handle: drives several request handles concurrently.

use crate::base::neterror::NetError;
use crate::transport::handle::{HandleId, RequestHandle};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use http::Response;
use std::fmt;

/// A finished transfer. The handle comes back so it can be returned to the
/// factory it was obtained from.
#[derive(Debug)]
pub struct CompletedTransfer {
    pub handle: RequestHandle,
    pub result: Result<Response<Bytes>, NetError>,
}

/// Container for concurrently driven transfers.
pub struct MultiHandle {
    id: HandleId,
    transfers: FuturesUnordered<BoxFuture<'static, CompletedTransfer>>,
}

impl fmt::Debug for MultiHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiHandle")
            .field("id", &self.id)
            .field("running", &self.transfers.len())
            .finish()
    }
}

impl Default for MultiHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiHandle {
    pub fn new() -> Self {
        let id = HandleId::next();
        tracing::debug!(multi = %id, "allocated multi handle");
        Self { id, transfers: FuturesUnordered::new() }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Queue a configured handle. Nothing runs until the multi handle is polled.
    pub fn add(&mut self, mut handle: RequestHandle) -> &mut Self {
        tracing::trace!(multi = %self.id, handle = %handle.id(), "transfer added");
        self.transfers.push(
            async move {
                let result = handle.perform().await;
                CompletedTransfer { handle, result }
            }
            .boxed(),
        );
        self
    }

    /// Number of transfers not yet completed.
    pub fn running(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// Wait for whichever transfer finishes first.
    pub async fn next_completed(&mut self) -> Option<CompletedTransfer> {
        self.transfers.next().await
    }

    /// Drive every queued transfer to completion, in completion order.
    pub async fn perform_all(&mut self) -> Vec<CompletedTransfer> {
        let mut done = Vec::with_capacity(self.transfers.len());
        while let Some(transfer) = self.transfers.next().await {
            done.push(transfer);
        }
        done
    }

    /// Abandon in-flight transfers, destroying their handles.
    pub fn clear(&mut self) -> usize {
        let abandoned = std::mem::take(&mut self.transfers).len();
        if abandoned > 0 {
            tracing::debug!(multi = %self.id, abandoned, "cleared in-flight transfers");
        }
        abandoned
    }
}

impl Drop for MultiHandle {
    fn drop(&mut self) {
        tracing::trace!(multi = %self.id, "multi handle destroyed");
    }
}
