use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{PayloadItem, PayloadSize, SendError};

/// Frames a de-framed body the way its [`PayloadSize`] announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadEncoder {
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
    /// Bytes as they come, closing the connection ends the body.
    Raw,
    /// Every item is dropped.
    NoBody,
}

impl From<PayloadSize> for PayloadEncoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(size) => PayloadEncoder::Length(LengthEncoder::new(size)),
            PayloadSize::Chunked => PayloadEncoder::Chunked(ChunkedEncoder::new()),
            PayloadSize::UntilClose => PayloadEncoder::Raw,
            PayloadSize::Empty => PayloadEncoder::NoBody,
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match (self, item) {
            (PayloadEncoder::Length(encoder), item) => encoder.encode(item, dst),
            (PayloadEncoder::Chunked(encoder), item) => encoder.encode(item, dst),
            (PayloadEncoder::Raw, PayloadItem::Chunk(bytes)) => {
                dst.put(bytes);
                Ok(())
            }
            (PayloadEncoder::Raw | PayloadEncoder::NoBody, _) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn encode(payload_size: PayloadSize, body: &'static [u8]) -> BytesMut {
        let mut encoder = PayloadEncoder::from(payload_size);
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(body)), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        dst
    }

    #[test]
    fn test_framing_follows_payload_size() {
        assert_eq!(&encode(PayloadSize::Length(4), b"body")[..], b"body");
        assert_eq!(&encode(PayloadSize::Chunked, b"body")[..], b"4\r\nbody\r\n0\r\n\r\n");
        assert_eq!(&encode(PayloadSize::UntilClose, b"body")[..], b"body");
        assert!(encode(PayloadSize::Empty, b"body").is_empty());
        assert!(matches!(PayloadEncoder::from(PayloadSize::Chunked), PayloadEncoder::Chunked(_)));
    }
}
