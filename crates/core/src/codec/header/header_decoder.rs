//! Decoder for the status line and header block of an upstream response.
//!
//! The upstream leg is parsed by hand, line by line, instead of with
//! `httparse`: the decoder keeps the peer's header spelling and order, and it
//! reports the exact bytes it consumed so they can be hex dumped.
//!
//! # Rules
//!
//! - Lines end with CRLF, a CR followed by any other byte is an error
//! - The status line is `version SP code [SP reason]`, fewer than two tokens
//!   or a non numeric code is an error
//! - A header line is split at its first colon, name and value are trimmed
//! - Repeated names append values
//! - The whole block, terminators included, must fit in `max_header_bytes`
//! - Folded (multi-line) header values are not supported
//! - Bytes that are not UTF-8 are replaced, never rejected

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::line_reader::LineReader;
use crate::ensure;
use crate::protocol::{HeaderSet, ParseError, ParseResult, ResponseHead, ResponseStatus};

/// Default limit of a response header block.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Incremental decoder producing a [`ParseResult`].
///
/// The decoder may be fed any number of partial buffers; it resets itself after
/// every complete header block.
#[derive(Debug)]
pub struct ResponseHeadDecoder {
    max_header_bytes: usize,
    line_reader: LineReader,
    status: Option<ResponseStatus>,
    headers: HeaderSet,
    raw: BytesMut,
}

impl Default for ResponseHeadDecoder {
    fn default() -> Self {
        Self::new(MAX_HEADER_BYTES)
    }
}

impl ResponseHeadDecoder {
    pub fn new(max_header_bytes: usize) -> Self {
        Self {
            max_header_bytes,
            line_reader: LineReader::new(),
            status: None,
            headers: HeaderSet::new(),
            raw: BytesMut::new(),
        }
    }

    /// Returns true once at least one byte of a head was consumed.
    pub fn is_started(&self) -> bool {
        !self.raw.is_empty()
    }

    fn finish(&mut self) -> Option<ParseResult> {
        let status = self.status.take()?;
        let headers = std::mem::take(&mut self.headers);
        let raw = self.raw.split().freeze();
        trace!(status = status.code(), header_count = headers.len(), raw_len = raw.len(), "parsed response head");
        Some(ParseResult::new(ResponseHead::new(status, headers), raw))
    }
}

impl Decoder for ResponseHeadDecoder {
    type Item = ParseResult;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(line) = self.line_reader.next_line(src)? else {
                let current_size = self.raw.len() + src.len();
                ensure!(current_size <= self.max_header_bytes, ParseError::too_large_header(current_size, self.max_header_bytes));
                return Ok(None);
            };

            self.raw.extend_from_slice(&line);
            self.raw.extend_from_slice(b"\r\n");
            ensure!(
                self.raw.len() <= self.max_header_bytes,
                ParseError::too_large_header(self.raw.len(), self.max_header_bytes)
            );

            if self.status.is_none() {
                self.status = Some(parse_status_line(&line)?);
                continue;
            }

            if line.is_empty() {
                return Ok(self.finish());
            }

            let (name, value) = parse_header_line(&line)?;
            self.headers.append(name, value);
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(result) => Ok(Some(result)),
            None if self.status.is_none() => Err(ParseError::unexpected_eof("status line")),
            None => Err(ParseError::unexpected_eof("header block")),
        }
    }
}

fn parse_status_line(line: &[u8]) -> Result<ResponseStatus, ParseError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();

    let (version, rest) = split_token(text);
    let (code, reason) = split_token(rest);
    ensure!(!version.is_empty() && !code.is_empty(), ParseError::invalid_status_line(text));

    let code = code.parse::<u16>().map_err(|_e| ParseError::invalid_status_line(text))?;
    let reason = (!reason.is_empty()).then(|| reason.to_string());
    Ok(ResponseStatus::new(version, code, reason))
}

fn parse_header_line(line: &[u8]) -> Result<(String, String), ParseError> {
    let text = String::from_utf8_lossy(line);
    let Some((name, value)) = text.split_once(':') else {
        return Err(ParseError::invalid_header(format!("missing colon in header line '{text}'")));
    };

    let name = name.trim();
    ensure!(!name.is_empty(), ParseError::invalid_header(format!("empty header name in '{text}'")));
    Ok((name.to_string(), value.trim().to_string()))
}

/// Splits off the first whitespace delimited token.
fn split_token(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(index) => (&s[..index], s[index..].trim_start()),
        None => (s, ""),
    }
}
