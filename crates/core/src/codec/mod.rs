//! Wire codecs for both legs of the proxy.
//!
//! Everything here implements tokio-util's [`Decoder`](tokio_util::codec::Decoder)
//! and [`Encoder`](tokio_util::codec::Encoder), so it plugs into `FramedRead`
//! and `FramedWrite` over any byte stream.
//!
//! - Upstream leg:
//!   - [`RequestEncoder`]: writes the outbound request head and body
//!   - [`ResponseDecoder`]: parses the upstream response head and body
//! - Client leg, for hosts:
//!   - [`ResponseEncoder`]: writes a response head and body
//! - Building blocks in [`header`] and [`body`]
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use rproxy_core::codec::ResponseDecoder;
//! use rproxy_core::protocol::{Message, PayloadSize};
//! use tokio_util::codec::Decoder;
//!
//! let mut buffer = BytesMut::from(&b"HTTP/1.1 204 No Content\r\n\r\n"[..]);
//! let mut decoder = ResponseDecoder::default();
//! let Some(Message::Header((result, payload_size))) = decoder.decode(&mut buffer).unwrap() else {
//!     panic!("expect response head");
//! };
//! assert_eq!(result.head().status().code(), 204);
//! assert_eq!(payload_size, PayloadSize::Empty);
//! ```

pub mod body;
pub mod header;
mod request_encoder;
mod response_decoder;
mod response_encoder;

pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
pub use response_encoder::ResponseEncoder;
