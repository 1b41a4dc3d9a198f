//! Decoder for chunked transfer encoding ([RFC 9112 section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1)).
//!
//! Each chunk is a hex size line, the payload and a CRLF. A zero size chunk
//! ends the body. Chunk extensions (`size;name=value`) are skipped and
//! trailer fields after the last chunk are consumed and discarded, so the
//! caller only ever sees payload bytes.

use std::cmp;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};
use ChunkedState::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: SizeStart, remaining_size: 0 }
    }

    /// Returns true once the terminal chunk and its trailer section were read.
    pub fn is_finished(&self) -> bool {
        self.state == End
    }

    /// Consumes one framing byte and moves to the next state.
    fn step(&mut self, byte: u8) -> Result<ChunkedState, ParseError> {
        let next = match (self.state, byte) {
            (SizeStart | Size, b) if b.is_ascii_hexdigit() => {
                let digit = u64::from((b as char).to_digit(16).unwrap_or_default());
                self.remaining_size = self
                    .remaining_size
                    .checked_mul(16)
                    .and_then(|size| size.checked_add(digit))
                    .ok_or_else(|| ParseError::invalid_chunk("chunk size overflows u64"))?;
                Size
            }
            (Size | SizeLws, b'\t' | b' ') => SizeLws,
            (Size | SizeLws, b';') => Extension,
            (Size | SizeLws | Extension, b'\r') => SizeLf,
            (Extension, b'\n') => return Err(ParseError::invalid_chunk("chunk extension contains newline")),
            (Extension, _) => Extension,
            (SizeLf, b'\n') if self.remaining_size == 0 => EndCr,
            (SizeLf, b'\n') => Body,
            (BodyCr, b'\r') => BodyLf,
            (BodyLf, b'\n') => SizeStart,
            (EndCr, b'\r') => EndLf,
            (EndCr | Trailer, _) if byte != b'\r' => Trailer,
            (Trailer, b'\r') => TrailerLf,
            (TrailerLf, b'\n') => EndCr,
            (EndLf, b'\n') => End,
            (state, b) => return Err(ParseError::invalid_chunk(format!("unexpected byte 0x{b:02x} in state {state:?}"))),
        };
        Ok(next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// First hex digit of a chunk size
    SizeStart,
    /// More hex digits
    Size,
    /// Whitespace after the size
    SizeLws,
    /// Skipping a chunk extension
    Extension,
    /// LF of the size line
    SizeLf,
    /// Chunk payload
    Body,
    /// CR after the payload
    BodyCr,
    /// LF after the payload
    BodyLf,
    /// A trailer field, discarded
    Trailer,
    /// LF after a trailer field
    TrailerLf,
    /// CR of the final empty line, or the start of a trailer field
    EndCr,
    /// LF of the final empty line
    EndLf,
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                End => {
                    trace!("finished reading chunked data");
                    return Ok(Some(PayloadItem::Eof));
                }
                Body => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let len = cmp::min(self.remaining_size, src.len() as u64) as usize;
                    self.remaining_size -= len as u64;
                    if self.remaining_size == 0 {
                        self.state = BodyCr;
                    }

                    let bytes = src.split_to(len).freeze();
                    trace!(len = bytes.len(), "read chunked bytes");
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }
                _ => {
                    let Some(&byte) = src.first() else {
                        return Ok(None);
                    };
                    src.advance(1);
                    self.state = self.step(byte)?;
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::unexpected_eof("chunked body")),
        }
    }
}
