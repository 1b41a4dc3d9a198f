//! Path predicates of match rules.

use std::fmt;

use regex::Regex;
use rproxy_core::protocol::ProxyError;

/// How the pattern of a rule is interpreted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// `*` matches any run of characters including `/`, `?` exactly one
    /// character and `\` escapes the next character.
    Glob,
    /// A regular expression that must match the whole path.
    Regex,
    /// Plain string equality.
    Exact,
    /// Matches every path, the pattern is ignored.
    All,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchKind::Glob => "glob",
            MatchKind::Regex => "regex",
            MatchKind::Exact => "exact",
            MatchKind::All => "all",
        };
        f.write_str(name)
    }
}

/// A compiled path predicate.
#[derive(Debug, Clone)]
pub(crate) enum PathMatcher {
    Pattern(Regex),
    Exact(String),
    All,
}

impl PathMatcher {
    /// Compiles `pattern`, which must already carry its leading `/`.
    pub(crate) fn compile(kind: MatchKind, pattern: &str) -> Result<Self, ProxyError> {
        match kind {
            MatchKind::Glob => compile_regex(&glob_to_regex(pattern), pattern),
            MatchKind::Regex => compile_regex(&format!("^(?:{pattern})$"), pattern),
            MatchKind::Exact => Ok(PathMatcher::Exact(pattern.to_string())),
            MatchKind::All => Ok(PathMatcher::All),
        }
    }

    pub(crate) fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Pattern(regex) => regex.is_match(path),
            PathMatcher::Exact(exact) => exact == path,
            PathMatcher::All => true,
        }
    }
}

fn compile_regex(regex: &str, pattern: &str) -> Result<PathMatcher, ProxyError> {
    Regex::new(regex)
        .map(PathMatcher::Pattern)
        .map_err(|e| ProxyError::config(format!("invalid path pattern '{pattern}': {e}")))
}

/// Prefixes `pattern` with `/` unless it starts with one.
pub(crate) fn with_leading_slash(pattern: &str) -> String {
    if pattern.starts_with('/') { pattern.to_string() } else { format!("/{pattern}") }
}

fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() * 2 + 8);
    regex.push_str("^(?s:");

    let mut chars = glob.chars();
    let mut buf = [0u8; 4];
    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(escaped.encode_utf8(&mut buf))),
                None => regex.push_str(r"\\"),
            },
            c => regex.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }

    regex.push_str(")$");
    regex
}
