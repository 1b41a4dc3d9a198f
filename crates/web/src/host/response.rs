use std::io;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::SinkExt;
use http::{Method, StatusCode};
use rproxy_core::codec::ResponseEncoder;
use rproxy_core::protocol::{
    HeaderSet, Message, PayloadItem, PayloadSize, ResponseHead, ResponseSink, ResponseStatus, SendError,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedWrite;
use tracing::{debug, warn};

const CONNECTION: &str = "Connection";

type ResponseMessage = Message<(ResponseHead, PayloadSize)>;

/// The client-facing response of one connection.
///
/// Body bytes are buffered until `buffer_size` is exceeded or the response is
/// flushed; the head goes out with the first body bytes. When no
/// `Content-Length` was declared by then the body is sent chunked. Closing
/// the connection after the response is the only keep-alive policy.
pub(crate) struct HostResponse<W> {
    writer: FramedWrite<W, ResponseEncoder>,
    status: StatusCode,
    headers: HeaderSet,
    buffer: BytesMut,
    buffer_size: usize,
    head_request: bool,
    committed: bool,
    aborted: bool,
    body_allowed: bool,
}

impl<W> std::fmt::Debug for HostResponse<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("committed", &self.committed)
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}

impl<W> HostResponse<W>
where
    W: AsyncWrite + Send + Unpin,
{
    pub(crate) fn new(writer: W, method: &Method, buffer_size: usize) -> Self {
        Self {
            writer: FramedWrite::new(writer, ResponseEncoder::new()),
            status: StatusCode::OK,
            headers: HeaderSet::new(),
            buffer: BytesMut::new(),
            buffer_size,
            head_request: method == Method::HEAD,
            committed: false,
            aborted: false,
            body_allowed: true,
        }
    }

    /// Sends the head with the framing known so far, then the buffered body.
    async fn commit(&mut self, finishing: bool) -> io::Result<()> {
        let forbids_body = self.head_request
            || self.status.is_informational()
            || self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::NOT_MODIFIED;

        let payload_size = if forbids_body {
            PayloadSize::Empty
        } else {
            match self.headers.content_length().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))? {
                Some(length) => PayloadSize::Length(length),
                None if finishing => PayloadSize::Length(self.buffer.len() as u64),
                None => PayloadSize::Chunked,
            }
        };

        self.headers.insert(CONNECTION, "close");
        let status =
            ResponseStatus::new("HTTP/1.1", self.status.as_u16(), self.status.canonical_reason().map(str::to_string));
        let head = ResponseHead::new(status, self.headers.clone());

        self.committed = true;
        self.body_allowed = !forbids_body;
        debug!(status = %self.status, ?payload_size, "commit response");

        self.writer.feed(ResponseMessage::Header((head, payload_size))).await.map_err(into_io)?;
        let buffered = self.buffer.split().freeze();
        self.feed_body(buffered).await
    }

    async fn feed_body(&mut self, data: Bytes) -> io::Result<()> {
        if !self.body_allowed || data.is_empty() {
            return Ok(());
        }
        self.writer.feed(ResponseMessage::from(data)).await.map_err(into_io)
    }

    /// Completes the response framing and closes the client connection.
    pub(crate) async fn finish(mut self) -> io::Result<()> {
        if self.aborted {
            debug!("response aborted, closing connection");
            return self.writer.get_mut().shutdown().await;
        }

        if !self.committed {
            self.commit(true).await?;
        }
        self.writer.send(ResponseMessage::Payload(PayloadItem::Eof)).await.map_err(into_io)?;
        self.writer.get_mut().shutdown().await
    }
}

#[async_trait]
impl<W> ResponseSink for HostResponse<W>
where
    W: AsyncWrite + Send + Unpin,
{
    fn status(&self) -> StatusCode {
        self.status
    }

    fn set_status(&mut self, status: StatusCode) {
        if self.committed {
            warn!(%status, "response already committed, status ignored");
            return;
        }
        self.status = status;
    }

    fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    fn add_header(&mut self, name: &str, value: &str) {
        if self.committed {
            warn!(name, "response already committed, header ignored");
            return;
        }
        self.headers.append(name, value);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        if self.committed {
            warn!(name, "response already committed, header ignored");
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
        if self.aborted {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "response aborted"));
        }

        if self.committed {
            return self.feed_body(Bytes::copy_from_slice(data)).await;
        }

        self.buffer.extend_from_slice(data);
        if self.buffer.len() > self.buffer_size {
            self.commit(false).await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.aborted {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "response aborted"));
        }

        if !self.committed {
            self.commit(false).await?;
        }
        SinkExt::<ResponseMessage>::flush(&mut self.writer).await.map_err(into_io)
    }

    async fn send_error(&mut self, status: StatusCode) -> io::Result<()> {
        if self.committed {
            return Err(io::Error::other("response already committed"));
        }

        self.status = status;
        self.headers = HeaderSet::new();
        self.buffer.clear();
        self.commit(true).await
    }
}

fn into_io(e: SendError) -> io::Error {
    match e {
        SendError::Io { source } => source,
        e => io::Error::new(io::ErrorKind::InvalidData, e),
    }
}
