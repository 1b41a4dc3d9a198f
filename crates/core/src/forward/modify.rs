use std::io;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::StatusCode;
use tracing::debug;

use crate::forward::{Forwarder, Transforms};
use crate::protocol::{DispatchStatus, HeaderSet, InboundRequest, ProxyError, ResponseSink};

/// Rewrites a complete response body, `None` keeps it unchanged.
pub type ContentTransform = dyn Fn(Bytes) -> Option<Bytes> + Send + Sync;

impl Forwarder {
    /// Forwards like [`forward_with`](Self::forward_with) but holds the
    /// response body back and passes it to `content_transform` first.
    ///
    /// When the transform returns new content, `Content-Length` is set to its
    /// length. Nothing is written after a failed forward. Without a content
    /// transform the body is streamed as usual.
    ///
    /// # Errors
    ///
    /// Fails for an invalid `target` and when the body can't be written to `sink`.
    pub async fn forward_modify(
        &self,
        target: &str,
        request: &mut (dyn InboundRequest + '_),
        sink: &mut (dyn ResponseSink + '_),
        transforms: &Transforms,
        content_transform: Option<&ContentTransform>,
    ) -> Result<DispatchStatus, ProxyError> {
        let Some(content_transform) = content_transform else {
            return self.forward_with(target, request, sink, transforms).await;
        };

        let mut capture = CaptureSink { inner: sink, body: BytesMut::new(), error_sent: false };
        let status = self.forward_with(target, request, &mut capture, transforms).await?;

        let CaptureSink { inner, body, error_sent } = capture;
        if error_sent {
            return Ok(status);
        }

        let body = body.freeze();
        match content_transform(body.clone()) {
            Some(content) => {
                debug!(original = body.len(), modified = content.len(), "response content modified");
                inner.set_content_length(content.len() as u64);
                inner.write(&content).await?;
            }
            None => inner.write(&body).await?,
        }
        inner.flush().await?;
        Ok(status)
    }
}

/// Passes the head through to the host but keeps the body in memory.
struct CaptureSink<'a, 'b> {
    inner: &'a mut (dyn ResponseSink + 'b),
    body: BytesMut,
    error_sent: bool,
}

#[async_trait]
impl ResponseSink for CaptureSink<'_, '_> {
    fn status(&self) -> StatusCode {
        self.inner.status()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.inner.set_status(status);
    }

    fn headers(&self) -> &HeaderSet {
        self.inner.headers()
    }

    fn add_header(&mut self, name: &str, value: &str) {
        self.inner.add_header(name, value);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.inner.set_header(name, value);
    }

    fn is_committed(&self) -> bool {
        self.inner.is_committed()
    }

    fn abort(&mut self) {
        self.error_sent = true;
        self.inner.abort();
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.body.extend_from_slice(data);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn send_error(&mut self, status: StatusCode) -> io::Result<()> {
        self.error_sent = true;
        self.body.clear();
        self.inner.send_error(status).await
    }
}
