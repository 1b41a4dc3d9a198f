//! Decodes inbound request heads with `httparse`.

use bytes::{Buf, BytesMut};
use http::Method;
use httparse::{Error, Status};
use rproxy_core::protocol::{HeaderSet, ParseError, PayloadSize};
use tokio_util::codec::Decoder;
use tracing::trace;

/// Maximum number of header lines in one request.
const MAX_HEADER_NUM: usize = 64;

/// A parsed request line plus headers.
#[derive(Debug)]
pub(crate) struct InboundHead {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Option<String>,
    pub(crate) headers: HeaderSet,
}

#[derive(Debug)]
pub(crate) struct RequestHeadDecoder {
    max_header_bytes: usize,
}

impl RequestHeadDecoder {
    pub(crate) fn new(max_header_bytes: usize) -> Self {
        Self { max_header_bytes }
    }
}

impl Decoder for RequestHeadDecoder {
    type Item = (InboundHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let body_offset = match req.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::invalid_header(format!("more than {MAX_HEADER_NUM} header lines")),
            e => ParseError::invalid_header(e),
        })? {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                if src.len() > self.max_header_bytes {
                    return Err(ParseError::too_large_header(src.len(), self.max_header_bytes));
                }
                return Ok(None);
            }
        };

        trace!(head_size = body_offset, "parsed request head");
        if body_offset > self.max_header_bytes {
            return Err(ParseError::too_large_header(body_offset, self.max_header_bytes));
        }

        if !matches!(req.version, Some(0 | 1)) {
            return Err(ParseError::invalid_header(format!("unsupported http version: {:?}", req.version)));
        }

        let method = req.method.ok_or_else(|| ParseError::invalid_header("missing method"))?;
        let method = Method::from_bytes(method.as_bytes()).map_err(ParseError::invalid_header)?;

        let target = req.path.ok_or_else(|| ParseError::invalid_header("missing request target"))?;
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };

        let headers: HeaderSet =
            req.headers.iter().map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned())).collect();
        let payload_size = PayloadSize::of_request(&headers)?;

        src.advance(body_offset);
        Ok(Some((InboundHead { method, path, query, headers }, payload_size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn decode(raw: &str) -> Result<Option<(InboundHead, PayloadSize)>, ParseError> {
        let mut buf = BytesMut::from(raw);
        RequestHeadDecoder::new(8 * 1024).decode(&mut buf)
    }

    #[test]
    fn test_get_with_query() {
        let raw = indoc! {"
            GET /index.html?lang=en&q=1 HTTP/1.1\r
            Host: 127.0.0.1:8080\r
            Accept: */*\r
            Accept: text/html\r
            \r
            "};

        let mut buf = BytesMut::from(raw);
        buf.extend_from_slice(b"next");
        let (head, payload_size) = RequestHeadDecoder::new(1024).decode(&mut buf).unwrap().unwrap();

        assert_eq!(head.method, Method::GET);
        assert_eq!(head.path, "/index.html");
        assert_eq!(head.query.as_deref(), Some("lang=en&q=1"));
        assert_eq!(head.headers.get("host"), Some("127.0.0.1:8080"));
        assert_eq!(head.headers.get_all("accept").len(), 2);
        assert_eq!(payload_size, PayloadSize::Empty);
        assert_eq!(&buf[..], b"next");
    }

    #[test]
    fn test_payload_size() {
        let (_, size) = decode("POST /a HTTP/1.1\r\nContent-Length: 10\r\n\r\n").unwrap().unwrap();
        assert_eq!(size, PayloadSize::Length(10));

        let (_, size) =
            decode("POST /a HTTP/1.1\r\nContent-Length: 10\r\nTransfer-Encoding: chunked\r\n\r\n").unwrap().unwrap();
        assert_eq!(size, PayloadSize::Chunked);
    }

    #[test]
    fn test_partial_head() {
        assert!(decode("GET / HTTP/1.1\r\nHost: a").unwrap().is_none());
        assert!(decode("").unwrap().is_none());
    }

    #[test]
    fn test_too_large_head() {
        let raw = format!("GET / HTTP/1.1\r\nX-Long: {}\r\n", "a".repeat(128));
        let mut buf = BytesMut::from(raw.as_str());
        let e = RequestHeadDecoder::new(64).decode(&mut buf).unwrap_err();
        assert!(matches!(e, ParseError::TooLargeHeader { max_size: 64, .. }));
    }

    #[test]
    fn test_invalid_head() {
        assert!(matches!(decode("GET / HTTP/2.0\r\n\r\n"), Err(ParseError::InvalidHeader { .. })));
        assert!(matches!(decode("GET /\x01 HTTP/1.1\r\n\r\n"), Err(ParseError::InvalidHeader { .. })));
        assert!(matches!(
            decode("PUT / HTTP/1.1\r\nContent-Length: ten\r\n\r\n"),
            Err(ParseError::InvalidContentLength { .. })
        ));
    }
}
