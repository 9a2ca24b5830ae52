//! Connection establishment for request handles: DNS -> TCP -> TLS.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::transport::options::{TlsContextCallback, TlsContextData};
use boring::ssl::{SslConnector, SslConnectorBuilder, SslMethod, SslVerifyMode};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;
use url::{Host, Url};

/// ALPN wire format for the only protocol handles speak.
const ALPN_HTTP11: &[u8] = b"\x08http/1.1";

/// Scheme, host and port a connection is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Origin {
    pub fn from_url(url: &Url) -> Result<Self, NetError> {
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(NetError::UnknownUrlScheme);
        }
        // Bare address for IPv6 so it can be resolved; brackets only go on the wire.
        let host = match url.host().ok_or(NetError::InvalidUrl)? {
            Host::Domain(d) => d.to_string(),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };
        let port = url.port_or_known_default().ok_or(NetError::InvalidUrl)?;
        Ok(Origin { scheme: scheme.to_string(), host, port })
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// Value for the `Host` request header.
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let default_port = if self.is_secure() { 443 } else { 80 };
        if self.port == default_port {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

/// A connected socket (TCP or SSL).
#[derive(Debug)]
pub enum SocketType {
    Tcp(TcpStream),
    Ssl(SslStream<TcpStream>),
}

impl AsyncRead for SocketType {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            SocketType::Ssl(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SocketType {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            SocketType::Ssl(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_flush(cx),
            SocketType::Ssl(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            SocketType::Ssl(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Result of a successful connect.
#[derive(Debug)]
pub struct Connected {
    pub socket: SocketType,
    pub local: SocketAddr,
    pub peer: SocketAddr,
}

fn connector_builder() -> Result<SslConnectorBuilder, NetError> {
    let mut builder =
        SslConnector::builder(SslMethod::tls()).map_err(|_| NetError::SslProtocolError)?;
    builder.set_alpn_protos(ALPN_HTTP11).map_err(|_| NetError::SslProtocolError)?;
    builder.set_verify(SslVerifyMode::PEER);
    Ok(builder)
}

/// Allocate the TLS context a fresh handle starts with.
pub fn default_connector() -> Result<SslConnector, NetError> {
    connector_builder().map(SslConnectorBuilder::build).map_err(|e| {
        tracing::error!(error = %e, "TLS context allocation failed");
        NetError::HandleAllocationFailed
    })
}

/// Build a TLS context with the handle's callback applied.
///
/// The data blob is only ever seen through the callback.
pub fn custom_connector(
    callback: &TlsContextCallback,
    data: Option<&TlsContextData>,
) -> Result<SslConnector, NetError> {
    let mut builder = connector_builder()?;
    callback.invoke(&mut builder, data)?;
    Ok(builder.build())
}

/// Per RFC 6066, SNI MUST NOT be set for raw IP addresses.
fn should_set_sni(host: &str) -> bool {
    host.parse::<std::net::IpAddr>().is_err()
}

/// Resolve, connect and (for https) run the TLS handshake.
pub async fn connect(origin: &Origin, tls: &SslConnector) -> Result<Connected, NetError> {
    let addrs = tokio::net::lookup_host((origin.host.as_str(), origin.port))
        .await
        .dns_context(&origin.host)?;

    let mut last_err = None;
    let mut stream = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => last_err = Some(e),
        }
    }
    let stream = match (stream, last_err) {
        (Some(s), _) => s,
        (None, Some(e)) => return Err(e).connection_context(&origin.host, origin.port),
        (None, None) => {
            return Err(NetError::dns_failed(
                &origin.host,
                io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
            ))
        }
    };

    let _ = stream.set_nodelay(true);
    let local = stream.local_addr().connection_context(&origin.host, origin.port)?;
    let peer = stream.peer_addr().connection_context(&origin.host, origin.port)?;
    tracing::debug!(host = %origin.host, port = origin.port, local = %local, "TCP connected");

    if !origin.is_secure() {
        return Ok(Connected { socket: SocketType::Tcp(stream), local, peer });
    }

    let mut config = tls.configure().map_err(|_| NetError::SslProtocolError)?;
    config.set_use_server_name_indication(should_set_sni(&origin.host));
    let tls_stream = tokio_boring::connect(config, &origin.host, stream).await.map_err(|e| {
        tracing::debug!(host = %origin.host, error = ?e, "SSL handshake failed");
        NetError::SslProtocolError
    })?;

    Ok(Connected { socket: SocketType::Ssl(tls_stream), local, peer })
}
