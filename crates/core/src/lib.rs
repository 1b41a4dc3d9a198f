//! The core of the rproxy reverse proxy.
//!
//! Given an inbound HTTP request, the core opens a fresh upstream connection
//! (plain or TLS), writes the request as HTTP/1.1 bytes, streams the request
//! body concurrently with reading the upstream response and relays the
//! response body in the framing the upstream chose.
//!
//! The inbound listener is not part of this crate. A host hands every request
//! to the core as an [`InboundRequest`](protocol::InboundRequest) together
//! with a [`ResponseSink`](protocol::ResponseSink).
//!
//! # Architecture
//!
//! - [`protocol`]: header sets, message heads, the host boundary and errors
//! - [`codec`]: tokio-util decoders and encoders for both legs
//! - [`forward`]: the forwarding engine, upstream connector and TLS trust
//! - [`config`]: engine settings
//!
//! # Limitations
//!
//! - HTTP/1.1 only, no upgrade to HTTP/2 or WebSocket
//! - One upstream connection per forwarded request, no pooling
//! - Header values folded over several lines are not supported
//! - Maximum header block size: 64KB by default

pub mod codec;
pub mod config;
pub mod forward;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
