//! Upstream response head types.

use std::fmt;

use bytes::Bytes;

use crate::protocol::HeaderSet;

/// The parsed status line of an upstream response.
///
/// Created once per parse and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseStatus {
    version: String,
    code: u16,
    reason: Option<String>,
}

impl ResponseStatus {
    pub fn new(version: impl Into<String>, code: u16, reason: Option<String>) -> Self {
        Self { version: version.into(), code, reason }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Returns true for responses that never carry a body: 1xx, 204 and 304.
    pub fn forbids_body(&self) -> bool {
        self.code < 200 || self.code == 204 || self.code == 304
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} {} {}", self.version, self.code, reason),
            None => write!(f, "{} {}", self.version, self.code),
        }
    }
}

/// A status line together with its header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    status: ResponseStatus,
    headers: HeaderSet,
}

impl ResponseHead {
    pub fn new(status: ResponseStatus, headers: HeaderSet) -> Self {
        Self { status, headers }
    }

    pub fn status(&self) -> &ResponseStatus {
        &self.status
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderSet {
        &mut self.headers
    }

    pub fn into_parts(self) -> (ResponseStatus, HeaderSet) {
        (self.status, self.headers)
    }
}

/// A parsed response head plus the exact bytes consumed while parsing it.
///
/// The raw bytes are kept for diagnostic hex dumps only.
#[derive(Debug, Clone)]
pub struct ParseResult {
    head: ResponseHead,
    raw: Bytes,
}

impl ParseResult {
    pub fn new(head: ResponseHead, raw: Bytes) -> Self {
        Self { head, raw }
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn into_head(self) -> ResponseHead {
        self.head
    }
}
