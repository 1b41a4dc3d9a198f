//! Protocol types shared by the codecs, the forwarding engine and the hosts.
//!
//! - **Headers** ([`header`]): [`HeaderSet`], an ordered, case-insensitive,
//!   multi-valued header block
//! - **Request side** ([`request`]): [`RequestLine`] and [`RequestHead`] of the
//!   outbound request
//! - **Response side** ([`response`]): [`ResponseStatus`], [`ResponseHead`] and
//!   [`ParseResult`] of the upstream response
//! - **Messages** ([`message`]): [`Message`], [`PayloadItem`] and [`PayloadSize`],
//!   the items flowing through the codecs
//! - **Host boundary** ([`exchange`]): [`InboundRequest`], [`ResponseSink`] and
//!   [`DispatchStatus`]
//! - **Errors** ([`error`]): [`ProxyError`], [`ParseError`] and [`SendError`]

pub mod header;
pub use header::HeaderSet;

mod request;
pub use request::RequestHead;
pub use request::RequestLine;

mod response;
pub use response::ParseResult;
pub use response::ResponseHead;
pub use response::ResponseStatus;

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod exchange;
pub use exchange::BodyReader;
pub use exchange::DispatchStatus;
pub use exchange::InboundRequest;
pub use exchange::ResponseSink;
pub use exchange::deny;

mod error;
pub use error::ErrorKind;
pub use error::ParseError;
pub use error::ProxyError;
pub use error::SendError;

mod memory;
pub use memory::MemoryRequest;
pub use memory::MemoryResponse;
