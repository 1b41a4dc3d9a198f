//! In-memory implementations of the host abstractions.
//!
//! Useful for embedding the engine without a client socket and for tests.

use std::io;
use std::io::Cursor;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{Method, StatusCode};
use tracing::debug;

use crate::protocol::{BodyReader, HeaderSet, InboundRequest, ResponseSink};

/// An inbound request assembled in memory.
pub struct MemoryRequest {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderSet,
    scheme: String,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    body: Option<BodyReader>,
}

impl std::fmt::Debug for MemoryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl MemoryRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderSet::new(),
            scheme: "http".into(),
            local_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            remote_addr: SocketAddr::from(([127, 0, 0, 1], 50000)),
            body: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_addrs(mut self, local_addr: SocketAddr, remote_addr: SocketAddr) -> Self {
        self.local_addr = local_addr;
        self.remote_addr = remote_addr;
        self
    }

    /// Sets a body that is already de-framed.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(Box::new(Cursor::new(body.into())));
        self
    }

    pub fn with_body_reader(mut self, body: BodyReader) -> Self {
        self.body = Some(body);
        self
    }
}

impl InboundRequest for MemoryRequest {
    fn method(&self) -> &Method {
        &self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn take_body(&mut self) -> Option<BodyReader> {
        self.body.take()
    }
}

/// A response sink that collects everything in memory.
///
/// Like a servlet container it buffers up to `buffer_size` body bytes before
/// committing; a flush always commits.
#[derive(Debug)]
pub struct MemoryResponse {
    status: StatusCode,
    headers: HeaderSet,
    committed: bool,
    aborted: bool,
    buffer_size: usize,
    body: BytesMut,
}

impl Default for MemoryResponse {
    fn default() -> Self {
        Self::with_buffer_size(8 * 1024)
    }
}

impl MemoryResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderSet::new(),
            committed: false,
            aborted: false,
            buffer_size,
            body: BytesMut::new(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Every body byte written so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body.freeze()
    }
}

#[async_trait]
impl ResponseSink for MemoryResponse {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn set_status(&mut self, status: StatusCode) {
        if self.committed {
            debug!(%status, "ignore status on committed response");
            return;
        }
        self.status = status;
    }

    fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    fn add_header(&mut self, name: &str, value: &str) {
        if self.committed {
            debug!(name, "ignore header on committed response");
            return;
        }
        self.headers.append(name, value);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        if self.committed {
            debug!(name, "ignore header on committed response");
            return;
        }
        self.headers.insert(name, value);
    }

    fn is_committed(&self) -> bool {
        self.committed
    }

    fn abort(&mut self) {
        self.aborted = true;
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.body.extend_from_slice(data);
        if self.body.len() > self.buffer_size {
            self.committed = true;
        }
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.committed = true;
        Ok(())
    }

    async fn send_error(&mut self, status: StatusCode) -> io::Result<()> {
        if self.committed {
            return Err(io::Error::other("response already committed"));
        }
        self.status = status;
        self.headers = HeaderSet::new();
        self.body.clear();
        self.committed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_commit_after_buffer_overflow() {
        let mut response = MemoryResponse::with_buffer_size(4);
        response.write(b"1234").await.unwrap();
        assert!(!response.is_committed());

        response.write(b"5").await.unwrap();
        assert!(response.is_committed());

        response.set_status(StatusCode::NOT_FOUND);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"12345");
    }

    #[tokio::test]
    async fn test_send_error_after_commit_fails() {
        let mut response = MemoryResponse::new();
        response.flush().await.unwrap();
        assert!(response.send_error(StatusCode::BAD_GATEWAY).await.is_err());
    }

    #[tokio::test]
    async fn test_request_body_taken_once() {
        let mut request = MemoryRequest::new(Method::POST, "/upload").with_body("hello");
        let mut body = request.take_body().unwrap();
        let mut buf = String::new();
        body.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "hello");
        assert!(request.take_body().is_none());
    }
}
