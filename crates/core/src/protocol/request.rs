//! Outbound request head types.
//!
//! The forwarding engine copies the inbound request into a [`RequestHead`],
//! lets the caller transform its headers and then serializes it to the
//! upstream connection.

use http::{Method, Version};

use crate::protocol::HeaderSet;

/// The request line: method, request-target and protocol version.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    method: Method,
    path: String,
    query: Option<String>,
    version: Version,
}

impl RequestLine {
    /// Creates a request line, a blank query is treated as no query.
    pub fn new(method: Method, path: impl Into<String>, query: Option<impl Into<String>>) -> Self {
        let query = query.map(Into::into).filter(|query: &String| !query.trim().is_empty());
        Self { method, path: path.into(), query, version: Version::HTTP_11 }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the request-target as written on the wire, `path[?query]`.
    pub fn target(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

/// A request line together with its header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    line: RequestLine,
    headers: HeaderSet,
}

impl RequestHead {
    pub fn new(line: RequestLine, headers: HeaderSet) -> Self {
        Self { line, headers }
    }

    pub fn line(&self) -> &RequestLine {
        &self.line
    }

    pub fn method(&self) -> &Method {
        self.line.method()
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderSet {
        &mut self.headers
    }

    pub fn into_parts(self) -> (RequestLine, HeaderSet) {
        (self.line, self.headers)
    }
}
