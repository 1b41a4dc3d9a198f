//! The forwarding engine.
//!
//! [`Forwarder`] executes one proxied request per call: it connects to the
//! upstream, writes the rewritten request head, relays the request body on a
//! separate task and streams the upstream response back into the host's
//! [`ResponseSink`](crate::protocol::ResponseSink).
//!
//! ```no_run
//! use rproxy_core::forward::Forwarder;
//! use rproxy_core::protocol::{MemoryRequest, MemoryResponse};
//!
//! # async fn run() -> Result<(), rproxy_core::protocol::ProxyError> {
//! let forwarder = Forwarder::default();
//! let mut request = MemoryRequest::new(http::Method::GET, "/index.html").with_header("Host", "www.example.com");
//! let mut response = MemoryResponse::new();
//! forwarder.forward("http://127.0.0.1:8081", &mut request, &mut response).await?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod headers;
mod modify;
mod relay;
mod tls;
mod transform;
mod upstream;

pub use engine::Forwarder;
pub use modify::ContentTransform;
pub use transform::Transforms;
