//! The HTTP/1.1 front end of the [`Server`](crate::Server).
//!
//! One request per connection: the head is parsed with `httparse`, the body is
//! de-framed lazily when a handler takes it, and the connection is closed once
//! the response is complete.

mod connection;
mod request;
mod request_decoder;
mod response;

pub(crate) use connection::serve_connection;

#[derive(Debug, Copy, Clone)]
pub(crate) struct HostSettings {
    pub(crate) max_header_bytes: usize,
    pub(crate) response_buffer_size: usize,
}
