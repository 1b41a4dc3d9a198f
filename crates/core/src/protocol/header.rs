//! Ordered, case-preserving HTTP header storage.
//!
//! [`HeaderSet`] keeps header names in the order they were first seen and
//! keeps every value of a name in arrival order. Names are compared ASCII
//! case-insensitively for lookup but stored and serialized exactly as they
//! were given, so a header block can be relayed without rewriting the
//! spelling chosen by the peer.

use std::fmt;

use crate::protocol::ParseError;

/// An ordered multimap of header name to values.
///
/// Appending to a name that already exists (in any letter case) adds a value
/// to the existing entry, so a case-insensitive lookup always resolves to one
/// entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<HeaderEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    name: String,
    values: Vec<String>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity) }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// Appends a value, creating the entry at the end if the name is new.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(index) => self.entries[index].values.push(value.into()),
            None => self.entries.push(HeaderEntry { name, values: vec![value.into()] }),
        }
    }

    /// Replaces all values of `name` with a single value.
    ///
    /// An existing entry keeps its position and its original spelling.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set_values(name, vec![value.into()]);
    }

    /// Replaces all values of `name`, removing the entry when `values` is empty.
    pub fn set_values(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        match (self.position(&name), values.is_empty()) {
            (Some(index), false) => self.entries[index].values = values,
            (Some(index), true) => {
                self.entries.remove(index);
            }
            (None, false) => self.entries.push(HeaderEntry { name, values }),
            (None, true) => {}
        }
    }

    /// Removes `name` and returns its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|index| self.entries.remove(index).values)
    }

    /// Returns all values of `name`, or an empty slice when it is absent.
    pub fn get_all(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(index) => &self.entries[index].values,
            None => &[],
        }
    }

    /// Returns the first value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of values over all names, i.e. the number of header lines on the wire.
    pub fn value_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.values.len()).sum()
    }

    /// Iterates names in insertion order together with their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|entry| (entry.name.as_str(), entry.values.as_slice()))
    }

    /// Iterates `(name, value)` pairs in wire order, one pair per header line.
    pub fn lines(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|entry| entry.values.iter().map(move |value| (entry.name.as_str(), value.as_str())))
    }

    /// Returns true if the last transfer coding of `Transfer-Encoding` is `chunked`.
    ///
    /// According to RFC 9112, chunked must be the final encoding if present.
    pub fn is_chunked(&self) -> bool {
        self.get_all(TRANSFER_ENCODING)
            .last()
            .and_then(|value| value.rsplit(',').next())
            .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
    }

    /// Parses `Content-Length`.
    ///
    /// Repeated values are accepted only when they are all identical.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidContentLength`] for non numeric or conflicting values.
    pub fn content_length(&self) -> Result<Option<u64>, ParseError> {
        let mut length = None;
        for value in self.get_all(CONTENT_LENGTH) {
            let parsed = value
                .trim()
                .parse::<u64>()
                .map_err(|_e| ParseError::invalid_content_length(format!("value {value} is not u64")))?;
            match length {
                Some(previous) if previous != parsed => {
                    return Err(ParseError::invalid_content_length(format!("conflicting values {previous} and {parsed}")));
                }
                _ => length = Some(parsed),
            }
        }
        Ok(length)
    }
}

pub const CONTENT_LENGTH: &str = "Content-Length";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const HOST: &str = "Host";
pub const EXPECT: &str = "Expect";
pub const VIA: &str = "Via";
pub const FORWARDED: &str = "Forwarded";
pub const X_FORWARDED_FOR: &str = "X-Forwarded-For";
pub const X_FORWARDED_HOST: &str = "X-Forwarded-Host";
pub const X_FORWARDED_PROTO: &str = "X-Forwarded-Proto";

impl<N, V> FromIterator<(N, V)> for HeaderSet
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = HeaderSet::new();
        headers.extend(iter);
        headers
    }
}

impl<N, V> Extend<(N, V)> for HeaderSet
where
    N: Into<String>,
    V: Into<String>,
{
    fn extend<T: IntoIterator<Item = (N, V)>>(&mut self, iter: T) {
        for (name, value) in iter {
            self.append(name, value);
        }
    }
}

impl fmt::Display for HeaderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_is_case_insensitive() {
        let mut headers = HeaderSet::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("set-cookie", "b=2");
        headers.append("Accept", "*/*");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.value_count(), 3);
        assert_eq!(headers.get_all("SET-COOKIE"), ["a=1", "b=2"]);
        assert_eq!(headers.lines().next(), Some(("Set-Cookie", "a=1")));
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let headers: HeaderSet = [("Host", "a"), ("X-One", "1"), ("Accept", "*/*"), ("x-one", "2")].into_iter().collect();

        let lines: Vec<_> = headers.lines().collect();
        assert_eq!(lines, vec![("Host", "a"), ("X-One", "1"), ("X-One", "2"), ("Accept", "*/*")]);
    }

    #[test]
    fn test_insert_keeps_position_and_spelling() {
        let mut headers: HeaderSet = [("host", "a"), ("Accept", "*/*")].into_iter().collect();
        headers.insert("HOST", "b");

        let lines: Vec<_> = headers.lines().collect();
        assert_eq!(lines, vec![("host", "b"), ("Accept", "*/*")]);
    }

    #[test]
    fn test_set_values_empty_removes() {
        let mut headers: HeaderSet = [("Via", "1.1 a")].into_iter().collect();
        headers.set_values("via", vec![]);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_is_chunked() {
        let headers = HeaderSet::new();
        assert!(!headers.is_chunked());

        let headers: HeaderSet = [("Transfer-Encoding", "gzip, Chunked")].into_iter().collect();
        assert!(headers.is_chunked());

        let headers: HeaderSet = [("transfer-encoding", "chunked, gzip")].into_iter().collect();
        assert!(!headers.is_chunked());
    }

    #[test]
    fn test_content_length() {
        let headers: HeaderSet = [("Content-Length", " 42 ")].into_iter().collect();
        assert_eq!(headers.content_length().unwrap(), Some(42));

        let headers: HeaderSet = [("Content-Length", "42"), ("content-length", "42")].into_iter().collect();
        assert_eq!(headers.content_length().unwrap(), Some(42));

        let headers: HeaderSet = [("Content-Length", "42"), ("content-length", "43")].into_iter().collect();
        assert!(headers.content_length().is_err());

        let headers: HeaderSet = [("Content-Length", "abc")].into_iter().collect();
        assert!(headers.content_length().is_err());

        assert_eq!(HeaderSet::new().content_length().unwrap(), None);
    }
}
