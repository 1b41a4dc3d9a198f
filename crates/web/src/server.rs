use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use rproxy_core::codec::header::MAX_HEADER_BYTES;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{Instrument, Level, error, info, info_span, warn};
use tracing_subscriber::FmtSubscriber;

use crate::Gateway;
use crate::handler::RequestHandler;
use crate::host::{HostSettings, serve_connection};
use crate::router::Router;

const DEFAULT_RESPONSE_BUFFER_SIZE: usize = 8 * 1024;

pub struct ServerBuilder {
    router: Option<Router>,
    fallback: Option<Box<dyn RequestHandler>>,
    address: Option<io::Result<Vec<SocketAddr>>>,
    settings: HostSettings,
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("router", &self.router)
            .field("address", &self.address)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ServerBuilder {
    fn new() -> Self {
        Self {
            router: None,
            fallback: None,
            address: None,
            settings: HostSettings {
                max_header_bytes: MAX_HEADER_BYTES,
                response_buffer_size: DEFAULT_RESPONSE_BUFFER_SIZE,
            },
        }
    }

    #[must_use]
    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().map(Iterator::collect));
        self
    }

    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// The handler for requests no routed handler completed, `404` by default.
    #[must_use]
    pub fn fallback(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.fallback = Some(Box::new(handler));
        self
    }

    /// How many body bytes a response buffers before it commits its head.
    #[must_use]
    pub fn response_buffer_size(mut self, size: usize) -> Self {
        self.settings.response_buffer_size = size;
        self
    }

    /// Limit for the head of inbound requests.
    #[must_use]
    pub fn max_header_bytes(mut self, size: usize) -> Self {
        self.settings.max_header_bytes = size;
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let router = self.router.ok_or(ServerBuildError::MissingRouter)?;
        let address = self.address.ok_or(ServerBuildError::MissingAddress)?.map_err(ServerBuildError::InvalidAddress)?;
        let gateway = match self.fallback {
            Some(fallback) => Gateway::with_fallback(router, fallback),
            None => Gateway::new(router),
        };
        Ok(Server { gateway: Arc::new(gateway), address, settings: self.settings })
    }
}

/// A plain HTTP/1.1 host dispatching every request through a [`Gateway`].
#[derive(Debug)]
pub struct Server {
    gateway: Arc<Gateway>,
    address: Vec<SocketAddr>,
    settings: HostSettings,
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("router must be set")]
    MissingRouter,
    #[error("address must be set")]
    MissingAddress,
    #[error("invalid address: {0}")]
    InvalidAddress(#[source] io::Error),
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Installs a `tracing` subscriber, binds the configured address and serves forever.
    pub async fn start(self) {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            warn!(cause = %e, "global tracing subscriber already set");
        }

        info!("start listening at {:?}", self.address);
        let listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return;
            }
        };

        self.serve(listener).await;
    }

    /// Accepts connections on `listener` forever.
    pub async fn serve(self, listener: TcpListener) {
        loop {
            let (tcp_stream, remote_addr) = match listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let gateway = Arc::clone(&self.gateway);
            let settings = self.settings;
            let span = info_span!("connection", %remote_addr);

            tokio::spawn(
                async move {
                    match serve_connection(tcp_stream, gateway, settings).await {
                        Ok(()) => info!("finished process, connection shutdown"),
                        Err(e) => error!(cause = %e, "connection error, connection shutdown"),
                    }
                }
                .instrument(span),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::DenyHandler;

    #[test]
    fn test_build_errors() {
        let e = Server::builder().address("127.0.0.1:0").build().unwrap_err();
        assert!(matches!(e, ServerBuildError::MissingRouter));

        let router = Router::builder().build().unwrap();
        let e = Server::builder().router(router).build().unwrap_err();
        assert!(matches!(e, ServerBuildError::MissingAddress));

        let router = Router::builder().build().unwrap();
        let e = Server::builder().router(router).address("not an address").build().unwrap_err();
        assert!(matches!(e, ServerBuildError::InvalidAddress(_)));
    }

    #[test]
    fn test_build() {
        let router = Router::builder().build().unwrap();
        let server = Server::builder()
            .router(router)
            .fallback(DenyHandler)
            .address("127.0.0.1:0")
            .response_buffer_size(1024)
            .build()
            .unwrap();
        assert_eq!(server.settings.response_buffer_size, 1024);
        assert_eq!(server.address.len(), 1);
    }
}
