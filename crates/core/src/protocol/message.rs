use bytes::{Buf, Bytes};

use crate::protocol::{HeaderSet, ParseError};

/// One item flowing through a codec: a message head, then its body pieces.
///
/// `T` is the head: `(RequestHead, PayloadSize)` on the upstream leg,
/// `(ParseResult, PayloadSize)` when decoding the upstream response.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    Header(T),
    Payload(PayloadItem<Data>),
}

/// A de-framed body piece, or the end of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    Eof,
}

/// The framing of a message body.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length` framed.
    Length(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// Neither was declared, the body ends when the peer closes.
    UntilClose,
    Empty,
}

impl PayloadSize {
    /// The framing of a request body as declared by `headers`.
    ///
    /// Chunked wins over `Content-Length`; a request declaring neither, or a
    /// zero length, has no body.
    ///
    /// # Errors
    ///
    /// Fails on an invalid `Content-Length`.
    pub fn of_request(headers: &HeaderSet) -> Result<Self, ParseError> {
        if headers.is_chunked() {
            return Ok(PayloadSize::Chunked);
        }

        Ok(match headers.content_length()? {
            Some(0) | None => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
        })
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

impl<T> Message<T> {
    /// The body piece, `None` for a head.
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Payload(item) => Some(item),
            Message::Header(_) => None,
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Message::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        if let PayloadItem::Chunk(bytes) = self { Some(bytes) } else { None }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        if let PayloadItem::Chunk(bytes) = self { Some(bytes) } else { None }
    }
}
