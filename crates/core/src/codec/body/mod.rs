//! Body framing for both legs of the proxy.
//!
//! ## Decoders
//! - [`ChunkedDecoder`]: chunked transfer encoding, extensions and trailers skipped
//! - [`LengthDecoder`]: `Content-Length` framed payloads
//! - [`UntilCloseDecoder`]: payloads delimited by connection close
//! - [`PayloadDecoder`]: picks one of the above from a [`PayloadSize`](crate::protocol::PayloadSize)
//!
//! ## Encoders
//! - [`ChunkedEncoder`]: re-chunks a de-framed body
//! - [`LengthEncoder`]: writes a fixed-length payload
//! - [`PayloadEncoder`]: picks one of the above

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;
mod until_close_decoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use length_decoder::LengthDecoder;
pub use length_encoder::LengthEncoder;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
pub use until_close_decoder::UntilCloseDecoder;
