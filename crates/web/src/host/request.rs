use std::io;
use std::net::SocketAddr;

use futures::{StreamExt, future};
use http::Method;
use rproxy_core::codec::body::PayloadDecoder;
use rproxy_core::protocol::{BodyReader, HeaderSet, InboundRequest, ParseError, PayloadItem, PayloadSize};
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

use crate::host::request_decoder::{InboundHead, RequestHeadDecoder};

/// A request read from a client connection of the [`Server`](crate::Server).
pub(crate) struct HostRequest {
    head: InboundHead,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    body: Option<BodyReader>,
}

impl std::fmt::Debug for HostRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRequest")
            .field("head", &self.head)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

impl HostRequest {
    pub(crate) fn new(head: InboundHead, local_addr: SocketAddr, remote_addr: SocketAddr, body: Option<BodyReader>) -> Self {
        Self { head, local_addr, remote_addr, body }
    }
}

impl InboundRequest for HostRequest {
    fn method(&self) -> &Method {
        &self.head.method
    }

    fn path(&self) -> &str {
        &self.head.path
    }

    fn query(&self) -> Option<&str> {
        self.head.query.as_deref()
    }

    fn headers(&self) -> &HeaderSet {
        &self.head.headers
    }

    fn scheme(&self) -> &str {
        "http"
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

/// Turns the rest of the connection into the de-framed body of a request.
///
/// Bytes already buffered by the head decoder are kept.
pub(crate) fn body_reader<R>(framed: FramedRead<R, RequestHeadDecoder>, payload_size: PayloadSize) -> BodyReader
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let payloads = framed
        .map_decoder(|_| PayloadDecoder::from(payload_size))
        .take_while(|item| future::ready(!matches!(item, Ok(PayloadItem::Eof))))
        .map(|item| match item {
            Ok(item) => Ok(item.into_bytes().unwrap_or_default()),
            Err(ParseError::Io { source }) => Err(source),
            Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        });

    Box::new(StreamReader::new(payloads))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_body(raw: &'static [u8]) -> io::Result<Vec<u8>> {
        let mut framed = FramedRead::new(raw, RequestHeadDecoder::new(1024));
        let (_, payload_size) = framed.next().await.unwrap().unwrap();

        let mut body = Vec::new();
        body_reader(framed, payload_size).read_to_end(&mut body).await?;
        Ok(body)
    }

    #[tokio::test]
    async fn test_length_body() {
        let body = read_body(b"PUT /a HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello trailing").await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn test_chunked_body() {
        let body = read_body(b"POST /a HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(body, b"abcde");
    }

    #[tokio::test]
    async fn test_truncated_body() {
        let e = read_body(b"PUT /a HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello").await.unwrap_err();
        assert!(matches!(e.kind(), io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof));
    }
}
