//! Message head processing for both legs of the proxy.
//!
//! - [`ResponseHeadDecoder`]: parses an upstream status line and header block
//!   by hand, enforcing the header size limit
//! - [`RequestHeadEncoder`]: serializes the outbound request head
//! - [`ResponseHeadEncoder`]: serializes a response head for a host

mod header_decoder;
mod header_encoder;
mod line_reader;

pub use header_decoder::MAX_HEADER_BYTES;
pub use header_decoder::ResponseHeadDecoder;
pub use header_encoder::RequestHeadEncoder;
pub use header_encoder::ResponseHeadEncoder;
