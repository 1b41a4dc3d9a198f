use std::error::Error;
use std::io;

use http::StatusCode;
use thiserror::Error;

/// Failure categories of a forwarded request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The upstream connection could not be established.
    BadGateway,
    /// The upstream violated HTTP/1.1 framing.
    Protocol,
    /// A stream read or write failed.
    Io,
    /// Invalid configuration or registration.
    Config,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("bad gateway: {reason}")]
    BadGateway {
        reason: String,
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },

    #[error("protocol error: {source}")]
    Protocol {
        #[source]
        source: ParseError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl ProxyError {
    pub fn bad_gateway<S: ToString>(reason: S) -> Self {
        Self::BadGateway { reason: reason.to_string(), source: None }
    }

    pub fn bad_gateway_caused_by<S, E>(reason: S, source: E) -> Self
    where
        S: ToString,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self::BadGateway { reason: reason.to_string(), source: Some(source.into()) }
    }

    pub fn config<S: ToString>(reason: S) -> Self {
        Self::Config { reason: reason.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::BadGateway { .. } => ErrorKind::BadGateway,
            ProxyError::Protocol { .. } => ErrorKind::Protocol,
            ProxyError::Io { .. } => ErrorKind::Io,
            ProxyError::Config { .. } => ErrorKind::Config,
        }
    }

    /// The status a client should see for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorKind::Protocol | ErrorKind::Io | ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ParseError> for ProxyError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Io { source } => Self::Io { source },
            source => Self::Protocol { source },
        }
    }
}

impl From<SendError> for ProxyError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Io { source } => Self::Io { source },
            e @ SendError::InvalidBody { .. } => Self::Io { source: io::Error::new(io::ErrorKind::InvalidData, e) },
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("invalid status line: '{line}'")]
    InvalidStatusLine { line: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid chunk: {reason}")]
    InvalidChunk { reason: String },

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("unexpected end of stream while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn invalid_status_line<S: ToString>(line: S) -> Self {
        Self::InvalidStatusLine { line: line.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(str: S) -> Self {
        Self::InvalidChunk { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn unexpected_eof(context: &'static str) -> Self {
        Self::UnexpectedEof { context }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
