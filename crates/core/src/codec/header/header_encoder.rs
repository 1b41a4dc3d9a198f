//! Serializers for message heads.
//!
//! [`RequestHeadEncoder`] writes the outbound request head to the upstream,
//! [`ResponseHeadEncoder`] writes a response head to a client of a host.
//! Both adjust `Content-Length` and `Transfer-Encoding` to the framing the
//! body encoder is going to use, then write every header value on its own
//! line in insertion order.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::Version;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use crate::protocol::{HeaderSet, PayloadSize, RequestHead, ResponseHead, SendError};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encoder for `METHOD SP target SP HTTP/1.1` plus headers.
#[derive(Debug)]
pub struct RequestHeadEncoder;

impl Encoder<(RequestHead, PayloadSize)> for RequestHeadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (RequestHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (head, payload_size) = item;
        let (line, mut headers) = head.into_parts();

        if line.version() != Version::HTTP_11 {
            error!(http_version = ?line.version(), "unsupported http version");
            return Err(io::Error::from(io::ErrorKind::Unsupported).into());
        }

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "{} {} HTTP/1.1\r\n", line.method(), line.target())?;

        match payload_size {
            PayloadSize::Length(n) => {
                headers.remove(TRANSFER_ENCODING);
                headers.insert(CONTENT_LENGTH, n.to_string());
            }
            PayloadSize::Chunked => {
                headers.remove(CONTENT_LENGTH);
                headers.insert(TRANSFER_ENCODING, "chunked");
            }
            PayloadSize::UntilClose | PayloadSize::Empty => {}
        }

        write_headers(&headers, dst);
        Ok(())
    }
}

/// Encoder for `HTTP/1.1 SP code SP reason` plus headers.
#[derive(Debug)]
pub struct ResponseHeadEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for ResponseHeadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (head, payload_size) = item;
        let (status, mut headers) = head.into_parts();

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "{status}\r\n")?;

        match payload_size {
            PayloadSize::Length(n) => {
                headers.remove(TRANSFER_ENCODING);
                headers.insert(CONTENT_LENGTH, n.to_string());
            }
            PayloadSize::Chunked => {
                headers.remove(CONTENT_LENGTH);
                headers.insert(TRANSFER_ENCODING, "chunked");
            }
            PayloadSize::Empty => {
                headers.remove(TRANSFER_ENCODING);
                if !status.forbids_body() && !headers.contains(CONTENT_LENGTH) {
                    headers.insert(CONTENT_LENGTH, "0");
                }
            }
            PayloadSize::UntilClose => {
                headers.remove(TRANSFER_ENCODING);
                headers.remove(CONTENT_LENGTH);
            }
        }

        write_headers(&headers, dst);
        Ok(())
    }
}

fn write_headers(headers: &HeaderSet, dst: &mut BytesMut) {
    for (name, value) in headers.lines() {
        dst.put_slice(name.as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(value.as_bytes());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
}

/// Fast writer implementation for writing to BytesMut.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
