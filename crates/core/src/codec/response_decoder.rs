//! Streaming decoder for upstream responses.
//!
//! The decoder works in two phases, the same way for every response:
//! 1. Head parsing with [`ResponseHeadDecoder`]
//! 2. Body parsing with a [`PayloadDecoder`] chosen from the head
//!
//! # Body framing
//!
//! - A response to `HEAD`, a 1xx, 204 or 304 response has no body
//! - `Transfer-Encoding: chunked` wins over `Content-Length`
//! - `Content-Length` gives a fixed length body
//! - Otherwise the body is either skipped or read until the upstream closes,
//!   depending on [`ResponseDecoder::read_until_close`]
//!
//! A 1xx head ends the exchange like any other bodiless response, bytes
//! after it are never read.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::{MAX_HEADER_BYTES, ResponseHeadDecoder};
use crate::protocol::{Message, ParseError, ParseResult, PayloadItem, PayloadSize, ResponseHead};

/// A decoder for upstream responses that handles both head and payload.
///
/// The decoder keeps its phase in `payload_decoder`:
/// - `None`: currently parsing the head
/// - `Some(PayloadDecoder)`: currently parsing the body
///
/// After the body EOF it yields nothing more.
#[derive(Debug)]
pub struct ResponseDecoder {
    head_decoder: ResponseHeadDecoder,
    payload_decoder: Option<PayloadDecoder>,
    head_request: bool,
    read_until_close: bool,
    finished: bool,
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new(MAX_HEADER_BYTES)
    }
}

impl ResponseDecoder {
    pub fn new(max_header_bytes: usize) -> Self {
        Self {
            head_decoder: ResponseHeadDecoder::new(max_header_bytes),
            payload_decoder: None,
            head_request: false,
            read_until_close: false,
            finished: false,
        }
    }

    /// The response answers a `HEAD` request and never has a body.
    pub fn for_head_request(mut self, head_request: bool) -> Self {
        self.head_request = head_request;
        self
    }

    /// Reads an unframed body until the upstream closes instead of skipping it.
    pub fn read_until_close(mut self, read_until_close: bool) -> Self {
        self.read_until_close = read_until_close;
        self
    }

    fn payload_size(&self, head: &ResponseHead) -> Result<PayloadSize, ParseError> {
        if self.head_request || head.status().forbids_body() {
            return Ok(PayloadSize::Empty);
        }

        if head.headers().is_chunked() {
            return Ok(PayloadSize::Chunked);
        }

        match head.headers().content_length()? {
            Some(length) => Ok(PayloadSize::Length(length)),
            None if self.read_until_close => Ok(PayloadSize::UntilClose),
            None => Ok(PayloadSize::Empty),
        }
    }

    fn on_payload(&mut self, item: Option<PayloadItem>) -> Option<Message<(ParseResult, PayloadSize)>> {
        match item {
            Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
            Some(item @ PayloadItem::Eof) => {
                self.payload_decoder.take();
                self.finished = true;
                Some(Message::Payload(item))
            }
            None => None,
        }
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ParseResult, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.finished {
            return Ok(None);
        }

        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            return Ok(self.on_payload(item));
        }

        let Some(result) = self.head_decoder.decode(src)? else {
            return Ok(None);
        };

        let payload_size = self.payload_size(result.head())?;
        trace!(status = result.head().status().code(), ?payload_size, "parsed response head");
        self.payload_decoder = Some(payload_size.into());
        Ok(Some(Message::Header((result, payload_size))))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }

        if self.finished {
            return Ok(None);
        }

        match &mut self.payload_decoder {
            Some(payload_decoder) => {
                let item = payload_decoder.decode_eof(src)?;
                Ok(self.on_payload(item))
            }
            None => {
                // reports which part of the head was cut off
                self.head_decoder.decode_eof(src)?;
                Err(ParseError::unexpected_eof("response head"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use indoc::indoc;

    fn crlf(s: &str) -> String {
        s.replace('\n', "\r\n")
    }

    fn decode_all(decoder: &mut ResponseDecoder, src: &mut BytesMut) -> (ParseResult, PayloadSize, Bytes, bool) {
        let Some(Message::Header((result, payload_size))) = decoder.decode(src).unwrap() else {
            panic!("expect response head");
        };

        let mut body = BytesMut::new();
        let mut eof = false;
        while let Some(message) = decoder.decode(src).unwrap() {
            match message.into_payload_item().unwrap() {
                PayloadItem::Chunk(bytes) => body.extend_from_slice(&bytes),
                PayloadItem::Eof => {
                    eof = true;
                    break;
                }
            }
        }
        (result, payload_size, body.freeze(), eof)
    }

    #[test]
    fn test_content_length_response() {
        let str = crlf(indoc! {r##"
        HTTP/1.1 200 OK
        Content-Type: text/plain
        Content-Length: 12

        hello world!"##});

        let mut src = BytesMut::from(str.as_str());
        let mut decoder = ResponseDecoder::default();
        let (result, payload_size, body, eof) = decode_all(&mut decoder, &mut src);

        assert_eq!(result.head().status().code(), 200);
        assert_eq!(payload_size, PayloadSize::Length(12));
        assert_eq!(&body[..], b"hello world!");
        assert!(eof);
        assert!(decoder.decode(&mut src).unwrap().is_none());
    }

    #[test]
    fn test_chunked_wins_over_length() {
        let str = crlf(indoc! {r##"
        HTTP/1.1 200 OK
        Content-Length: 100
        Transfer-Encoding: chunked

        5
        hello
        0

        "##});

        let mut src = BytesMut::from(str.as_str());
        let mut decoder = ResponseDecoder::default();
        let (_result, payload_size, body, eof) = decode_all(&mut decoder, &mut src);

        assert_eq!(payload_size, PayloadSize::Chunked);
        assert_eq!(&body[..], b"hello");
        assert!(eof);
    }

    #[test]
    fn test_bodiless_responses() {
        let mut src = BytesMut::from(&b"HTTP/1.1 304 Not Modified\r\nContent-Length: 10\r\n\r\n"[..]);
        let mut decoder = ResponseDecoder::default();
        let (_result, payload_size, body, eof) = decode_all(&mut decoder, &mut src);
        assert_eq!(payload_size, PayloadSize::Empty);
        assert!(body.is_empty());
        assert!(eof);

        let mut src = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n"[..]);
        let mut decoder = ResponseDecoder::default().for_head_request(true);
        let (result, payload_size, _body, _eof) = decode_all(&mut decoder, &mut src);
        assert_eq!(payload_size, PayloadSize::Empty);
        assert_eq!(result.head().headers().get("content-length"), Some("10"));
    }

    #[test]
    fn test_unframed_body() {
        let input = &b"HTTP/1.1 200 OK\r\nServer: legacy\r\n\r\nstream"[..];

        let mut src = BytesMut::from(input);
        let mut decoder = ResponseDecoder::default();
        let (_result, payload_size, body, _eof) = decode_all(&mut decoder, &mut src);
        assert_eq!(payload_size, PayloadSize::Empty);
        assert!(body.is_empty());

        let mut src = BytesMut::from(input);
        let mut decoder = ResponseDecoder::default().read_until_close(true);
        let Some(Message::Header((_result, payload_size))) = decoder.decode(&mut src).unwrap() else {
            panic!("expect response head");
        };
        assert_eq!(payload_size, PayloadSize::UntilClose);

        let chunk = decoder.decode(&mut src).unwrap().unwrap().into_payload_item().unwrap();
        assert_eq!(&chunk.as_bytes().unwrap()[..], b"stream");
        assert!(decoder.decode(&mut src).unwrap().is_none());

        let eof = decoder.decode_eof(&mut src).unwrap().unwrap().into_payload_item().unwrap();
        assert!(eof.is_eof());
        assert!(decoder.decode_eof(&mut src).unwrap().is_none());
    }

    #[test]
    fn test_interim_response_ends_exchange() {
        let mut src = BytesMut::from(&b"HTTP/1.1 102 Processing\r\nX-Step: 1\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n"[..]);
        let mut decoder = ResponseDecoder::default().read_until_close(true);
        let (result, payload_size, body, eof) = decode_all(&mut decoder, &mut src);
        assert_eq!(result.head().status().code(), 102);
        assert_eq!(result.head().headers().get("x-step"), Some("1"));
        assert_eq!(payload_size, PayloadSize::Empty);
        assert!(body.is_empty());
        assert!(eof);

        assert!(decoder.decode(&mut src).unwrap().is_none());
        assert!(src.starts_with(b"HTTP/1.1 201"));
    }

    #[test]
    fn test_eof_in_head() {
        let mut src = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-"[..]);
        let mut decoder = ResponseDecoder::default();
        assert!(decoder.decode(&mut src).unwrap().is_none());

        let result = decoder.decode_eof(&mut src);
        assert!(matches!(result, Err(ParseError::UnexpectedEof { context: "header block" })));
    }

    #[test]
    fn test_invalid_content_length() {
        let mut src = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: ten\r\n\r\n"[..]);
        let result = ResponseDecoder::default().decode(&mut src);
        assert!(matches!(result, Err(ParseError::InvalidContentLength { .. })));
    }
}
