//! CRLF line splitting for the header block.
//!
//! A line ends at a CR immediately followed by LF. A CR followed by anything
//! else is a framing error; a bare LF is kept as part of the line.

use bytes::{Buf, BytesMut};

use crate::protocol::ParseError;

/// Splits complete lines off the front of a buffer.
///
/// The reader remembers how far it already scanned, so bytes arriving in
/// small pieces are looked at only once.
#[derive(Debug, Default, Clone)]
pub(crate) struct LineReader {
    scanned: usize,
}

impl LineReader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the next line without its terminator, `None` when no complete
    /// line is buffered yet.
    ///
    /// On success the line and its CRLF are removed from `src`.
    pub(crate) fn next_line(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
        let Some(offset) = src[self.scanned..].iter().position(|&b| b == b'\r') else {
            self.scanned = src.len();
            return Ok(None);
        };

        let cr = self.scanned + offset;
        match src.get(cr + 1) {
            None => {
                // wait for the byte after CR
                self.scanned = cr;
                Ok(None)
            }
            Some(b'\n') => {
                self.scanned = 0;
                let line = src.split_to(cr);
                src.advance(2);
                Ok(Some(line))
            }
            Some(&b) => Err(ParseError::invalid_header(format!("expected LF after CR, found byte 0x{b:02x}"))),
        }
    }
}
