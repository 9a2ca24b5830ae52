//! The request handle: one configured transport session.
//!
//! A `RequestHandle` owns its TLS context and at most one idle keep-alive
//! connection. Per-request configuration and transfer info are cleared by
//! [`RequestHandle::reset`]; the TLS context and the live connection survive
//! it, which is what makes pooled reuse worthwhile.

use crate::base::context::TimeoutResultExt;
use crate::base::neterror::NetError;
use crate::transport::connect::{self, Origin};
use crate::transport::options::{TlsContextCallback, TlsContextData};
use boring::ssl::SslConnector;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONNECTION, HOST};
use http::{HeaderMap, Method, Request, Response, Version};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique tag of a request or multi handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub(crate) fn next() -> Self {
        HandleId(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-request configuration.
#[derive(Debug, Clone, Default)]
struct RequestConfig {
    method: Method,
    url: Option<Url>,
    headers: HeaderMap,
    body: Bytes,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    tls_context_callback: Option<TlsContextCallback>,
    tls_context_data: Option<TlsContextData>,
}

/// What the last transfer on a handle observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferInfo {
    /// Local address of the connection used.
    pub local_ip: Option<IpAddr>,
    /// Remote address of the connection used.
    pub primary_ip: Option<IpAddr>,
    /// Status code of the last response.
    pub response_code: Option<u16>,
}

/// Idle keep-alive connection kept by a handle.
struct CachedConnection {
    origin: Origin,
    tls_callback: Option<TlsContextCallback>,
    tls_data: Option<TlsContextData>,
    sender: http1::SendRequest<Full<Bytes>>,
    local: SocketAddr,
    peer: SocketAddr,
}

fn same_tls<T>(a: Option<&T>, b: Option<&T>, eq: impl Fn(&T, &T) -> bool) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => eq(a, b),
        _ => false,
    }
}

/// A transport handle carrying one HTTP request at a time.
///
/// Handles are move-only: whoever holds the value owns it, and dropping it
/// destroys the native state.
pub struct RequestHandle {
    id: HandleId,
    config: RequestConfig,
    info: TransferInfo,
    tls: SslConnector,
    connection: Option<CachedConnection>,
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("info", &self.info)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

impl RequestHandle {
    /// Allocate a fresh handle.
    ///
    /// Fails with [`NetError::HandleAllocationFailed`] when the native TLS
    /// context cannot be created.
    pub fn init() -> Result<Self, NetError> {
        let tls = connect::default_connector()?;
        let id = HandleId::next();
        tracing::debug!(handle = %id, "allocated request handle");
        Ok(Self {
            id,
            config: RequestConfig::default(),
            info: TransferInfo::default(),
            tls,
            connection: None,
        })
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Clear all per-request configuration and transfer info.
    pub fn reset(&mut self) {
        self.config = RequestConfig::default();
        self.info = TransferInfo::default();
    }

    pub fn set_method(&mut self, method: Method) -> &mut Self {
        self.config.method = method;
        self
    }

    pub fn set_url(&mut self, url: Url) -> &mut Self {
        self.config.url = Some(url);
        self
    }

    /// Append a request header.
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.config.headers.append(name, value);
        self
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.config.body = body.into();
        self
    }

    /// Limit for the whole transfer, connect included.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    pub fn set_tls_context_callback(&mut self, callback: TlsContextCallback) -> &mut Self {
        self.config.tls_context_callback = Some(callback);
        self
    }

    pub fn set_tls_context_data(&mut self, data: TlsContextData) -> &mut Self {
        self.config.tls_context_data = Some(data);
        self
    }

    pub fn method(&self) -> &Method {
        &self.config.method
    }

    pub fn url(&self) -> Option<&Url> {
        self.config.url.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.config.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.config.body
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.config.timeout
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.config.connect_timeout
    }

    pub fn tls_context_callback(&self) -> Option<&TlsContextCallback> {
        self.config.tls_context_callback.as_ref()
    }

    pub fn tls_context_data(&self) -> Option<&TlsContextData> {
        self.config.tls_context_data.as_ref()
    }

    pub fn info(&self) -> TransferInfo {
        self.info
    }

    /// Local IP of the last transfer, if it got as far as connecting.
    pub fn local_ip(&self) -> Option<IpAddr> {
        self.info.local_ip
    }

    pub fn primary_ip(&self) -> Option<IpAddr> {
        self.info.primary_ip
    }

    pub fn response_code(&self) -> Option<u16> {
        self.info.response_code
    }

    /// Whether an idle keep-alive connection is held.
    pub fn has_cached_connection(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| !c.sender.is_closed())
    }

    /// Run the configured request to completion and buffer the response.
    pub async fn perform(&mut self) -> Result<Response<Bytes>, NetError> {
        self.info = TransferInfo::default();
        let url = self.config.url.clone().ok_or(NetError::InvalidUrl)?;
        let origin = Origin::from_url(&url)?;

        let timeout = self.config.timeout;
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(&url, &origin))
                .await
                .or_timed_out(NetError::TimedOut),
            None => self.exchange(&url, &origin).await,
        }
    }

    async fn exchange(&mut self, url: &Url, origin: &Origin) -> Result<Response<Bytes>, NetError> {
        let (mut conn, reused) = match self.take_reusable(origin).await {
            Some(conn) => (conn, true),
            None => (self.open(origin).await?, false),
        };
        self.record_endpoints(&conn);

        let request = self.build_request(url, origin)?;
        let response = match conn.sender.try_send_request(request).await {
            Ok(response) => response,
            Err(mut err) => match err.take_message() {
                // hyper hands the request back only if none of it was written,
                // so a peer that closed an idle connection never saw it.
                Some(unsent) if reused => {
                    tracing::debug!(
                        handle = %self.id,
                        error = %err.error(),
                        "reused connection closed before the request was written, reconnecting"
                    );
                    conn = self.open(origin).await?;
                    self.record_endpoints(&conn);
                    conn.sender.send_request(unsent).await.map_err(|e| self.send_failed(e))?
                }
                _ => return Err(self.send_failed(err.into_error())),
            },
        };

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| {
                tracing::debug!(handle = %self.id, error = %e, "failed reading response body");
                NetError::InvalidHttpResponse
            })?
            .to_bytes();
        self.info.response_code = Some(parts.status.as_u16());

        let close = parts.version == Version::HTTP_10
            || parts
                .headers
                .get(CONNECTION)
                .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"close"));
        if !close {
            self.connection = Some(conn);
        }

        Ok(Response::from_parts(parts, body))
    }

    fn send_failed(&self, e: hyper::Error) -> NetError {
        tracing::debug!(handle = %self.id, error = %e, "request failed");
        if e.is_parse() {
            NetError::InvalidHttpResponse
        } else if e.is_incomplete_message() {
            NetError::EmptyResponse
        } else {
            NetError::ConnectionClosed
        }
    }

    fn record_endpoints(&mut self, conn: &CachedConnection) {
        self.info.local_ip = Some(conn.local.ip());
        self.info.primary_ip = Some(conn.peer.ip());
    }

    async fn take_reusable(&mut self, origin: &Origin) -> Option<CachedConnection> {
        let mut conn = self.connection.take()?;
        let matches = conn.origin == *origin
            && same_tls(
                conn.tls_callback.as_ref(),
                self.config.tls_context_callback.as_ref(),
                TlsContextCallback::ptr_eq,
            )
            && same_tls(
                conn.tls_data.as_ref(),
                self.config.tls_context_data.as_ref(),
                TlsContextData::ptr_eq,
            );
        if !matches || conn.sender.is_closed() {
            tracing::debug!(handle = %self.id, host = %conn.origin.host, "dropping cached connection");
            return None;
        }
        conn.sender.ready().await.ok()?;
        tracing::debug!(handle = %self.id, host = %origin.host, "reusing cached connection");
        Some(conn)
    }

    async fn open(&self, origin: &Origin) -> Result<CachedConnection, NetError> {
        let custom;
        let tls = match &self.config.tls_context_callback {
            Some(callback) => {
                custom =
                    connect::custom_connector(callback, self.config.tls_context_data.as_ref())?;
                &custom
            }
            None => &self.tls,
        };

        let connecting = connect::connect(origin, tls);
        let connected = match self.config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connecting)
                .await
                .or_timed_out(NetError::ConnectionTimedOut)?,
            None => connecting.await?,
        };

        let (sender, driver) =
            http1::handshake(TokioIo::new(connected.socket)).await.map_err(|e| {
                tracing::debug!(handle = %self.id, error = %e, "HTTP/1.1 handshake failed");
                NetError::ConnectionFailed
            })?;
        let id = self.id;
        tokio::spawn(async move {
            if let Err(e) = driver.await {
                tracing::debug!(handle = %id, error = %e, "connection closed with error");
            }
        });

        Ok(CachedConnection {
            origin: origin.clone(),
            tls_callback: self.config.tls_context_callback.clone(),
            tls_data: self.config.tls_context_data.clone(),
            sender,
            local: connected.local,
            peer: connected.peer,
        })
    }

    fn build_request(&self, url: &Url, origin: &Origin) -> Result<Request<Full<Bytes>>, NetError> {
        let target = &url[url::Position::BeforePath..url::Position::AfterQuery];
        let mut builder = Request::builder().method(self.config.method.clone()).uri(target);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.config.headers.clone());
            if !headers.contains_key(HOST) {
                let host =
                    HeaderValue::from_str(&origin.authority()).map_err(|_| NetError::InvalidUrl)?;
                headers.insert(HOST, host);
            }
        }
        builder.body(Full::new(self.config.body.clone())).map_err(|_| NetError::InvalidUrl)
    }
}

impl Drop for RequestHandle {
    fn drop(&mut self) {
        tracing::trace!(handle = %self.id, "request handle destroyed");
    }
}
