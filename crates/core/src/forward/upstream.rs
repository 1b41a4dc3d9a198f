//! Opening the one upstream connection a forwarded request uses.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::Uri;
use pin_project_lite::pin_project;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::config::ForwardConfig;
use crate::forward::tls;
use crate::protocol::ProxyError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Scheme {
    Http,
    Https,
}

/// The upstream endpoint taken from a target URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Upstream {
    scheme: Scheme,
    /// As written in the URL, IPv6 literals keep their brackets.
    host: String,
    port: u16,
    explicit_port: bool,
}

impl Upstream {
    /// # Errors
    ///
    /// An unsupported scheme is a bad gateway, a URL without host a configuration error.
    pub(crate) fn from_uri(uri: &Uri) -> Result<Self, ProxyError> {
        let scheme = match uri.scheme_str() {
            Some(s) if s.eq_ignore_ascii_case("http") => Scheme::Http,
            Some(s) if s.eq_ignore_ascii_case("https") => Scheme::Https,
            Some(s) => return Err(ProxyError::bad_gateway(format!("unsupported protocol '{s}'"))),
            None => return Err(ProxyError::bad_gateway("unsupported protocol, target has no scheme")),
        };

        let host = match uri.host() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(ProxyError::config(format!("target '{uri}' has no host"))),
        };

        let default_port = match scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        };

        Ok(Self { scheme, host, port: uri.port_u16().unwrap_or(default_port), explicit_port: uri.port_u16().is_some() })
    }

    pub(crate) fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// The value of the outbound `Host` header, the port only when the URL names one.
    pub(crate) fn host_header(&self) -> String {
        if self.explicit_port { format!("{}:{}", self.host, self.port) } else { self.host.clone() }
    }

    /// The host name or address to resolve, without IPv6 brackets.
    pub(crate) fn connect_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

pin_project! {
    /// A plain or TLS wrapped upstream connection.
    #[project = UpstreamStreamProj]
    pub(crate) enum UpstreamStream {
        Plain { #[pin] stream: TcpStream },
        Tls { #[pin] stream: Box<TlsStream<TcpStream>> },
    }
}

impl fmt::Debug for UpstreamStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamStream::Plain { stream } => f.debug_tuple("Plain").field(stream).finish(),
            UpstreamStream::Tls { stream } => f.debug_tuple("Tls").field(stream.get_ref().0).finish(),
        }
    }
}

impl AsyncRead for UpstreamStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            UpstreamStreamProj::Plain { stream } => stream.poll_read(cx, buf),
            UpstreamStreamProj::Tls { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for UpstreamStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.project() {
            UpstreamStreamProj::Plain { stream } => stream.poll_write(cx, buf),
            UpstreamStreamProj::Tls { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            UpstreamStreamProj::Plain { stream } => stream.poll_flush(cx),
            UpstreamStreamProj::Tls { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            UpstreamStreamProj::Plain { stream } => stream.poll_shutdown(cx),
            UpstreamStreamProj::Tls { stream } => stream.poll_shutdown(cx),
        }
    }
}

/// Connects to `upstream`, including the TLS handshake for `https`.
///
/// Every failure, a timeout included, is a bad gateway.
pub(crate) async fn connect(upstream: &Upstream, config: &ForwardConfig) -> Result<UpstreamStream, ProxyError> {
    let address = (upstream.connect_host(), upstream.port());
    let tcp_stream = match timeout(config.connect_timeout(), TcpStream::connect(address)).await {
        Ok(Ok(tcp_stream)) => tcp_stream,
        Ok(Err(e)) => return Err(ProxyError::bad_gateway_caused_by(format!("can't connect to {upstream}"), e)),
        Err(e) => return Err(ProxyError::bad_gateway_caused_by(format!("connect to {upstream} timed out"), e)),
    };
    tcp_stream.set_nodelay(true)?;
    debug!(%upstream, local_addr = ?tcp_stream.local_addr().ok(), "upstream connected");

    if upstream.scheme() == Scheme::Http {
        return Ok(UpstreamStream::Plain { stream: tcp_stream });
    }

    let client_config = tls::client_config(config.trust_policy())?;
    let server_name = ServerName::try_from(upstream.connect_host().to_string())
        .map_err(|e| ProxyError::bad_gateway_caused_by(format!("invalid tls server name '{}'", upstream.connect_host()), e))?;

    let connector = TlsConnector::from(client_config);
    match timeout(config.connect_timeout(), connector.connect(server_name, tcp_stream)).await {
        Ok(Ok(tls_stream)) => Ok(UpstreamStream::Tls { stream: Box::new(tls_stream) }),
        Ok(Err(e)) => Err(ProxyError::bad_gateway_caused_by(format!("tls handshake with {upstream} failed"), e)),
        Err(e) => Err(ProxyError::bad_gateway_caused_by(format!("tls handshake with {upstream} timed out"), e)),
    }
}
