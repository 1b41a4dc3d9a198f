//! The boundary between the proxy core and the hosting HTTP server.
//!
//! The host owns the inbound connection. It hands the core one
//! [`InboundRequest`] and one [`ResponseSink`] per request; the core never
//! touches the client socket directly.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use http::{Method, StatusCode};
use tokio::io::AsyncRead;

use crate::protocol::HeaderSet;
use crate::protocol::header::CONTENT_LENGTH;

/// The de-framed inbound request body.
///
/// It is owned so the engine can move it into the request body relay task.
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin + 'static>;

/// Outcome of a handler invocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    /// The response was fully produced, routing stops.
    Completed,
    /// The handler declined, the next matching handler is tried.
    Continue,
}

/// A parsed inbound request as delivered by the host.
pub trait InboundRequest: Send {
    fn method(&self) -> &Method;

    /// The request path as sent by the client, without the query string.
    fn path(&self) -> &str;

    fn query(&self) -> Option<&str>;

    fn headers(&self) -> &HeaderSet;

    /// The scheme the client used to reach us, `http` or `https`.
    fn scheme(&self) -> &str;

    fn local_addr(&self) -> SocketAddr;

    fn remote_addr(&self) -> SocketAddr;

    /// Takes the body stream, returns `None` once taken.
    fn take_body(&mut self) -> Option<BodyReader>;
}

/// The client-facing response of the host.
///
/// Status and headers may change until the sink is committed, which happens
/// when the host first sends bytes to the client (at the latest on
/// [`flush`](ResponseSink::flush)).
#[async_trait]
pub trait ResponseSink: Send {
    fn status(&self) -> StatusCode;

    fn set_status(&mut self, status: StatusCode);

    fn headers(&self) -> &HeaderSet;

    fn add_header(&mut self, name: &str, value: &str);

    /// Replaces every value of `name`.
    fn set_header(&mut self, name: &str, value: &str);

    fn set_content_length(&mut self, length: u64) {
        self.set_header(CONTENT_LENGTH, &length.to_string());
    }

    fn is_committed(&self) -> bool;

    /// Marks the response as broken after it was committed.
    ///
    /// A host must then close the client connection without completing the
    /// body framing, so a truncated body never looks complete.
    fn abort(&mut self) {}

    async fn write(&mut self, data: &[u8]) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()>;

    /// Discards headers and buffered body and answers with an empty `status` response.
    ///
    /// # Errors
    ///
    /// Fails when the response is already committed.
    async fn send_error(&mut self, status: StatusCode) -> io::Result<()>;
}

/// Answers with `401 Unauthorized`, the minimal non forwarding outcome.
pub fn deny(sink: &mut (dyn ResponseSink + '_)) -> DispatchStatus {
    sink.set_status(StatusCode::UNAUTHORIZED);
    DispatchStatus::Completed
}
