//! Utility macros and functions for the proxy core.
//!
//! This module provides helper macros and functions that are used internally
//! by the forwarding engine and the codecs.

use std::fmt::Write;

/// A macro for early returns with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
/// It's useful for validation checks where you want to return early with an error
/// if some condition is not satisfied.
///
/// # Example
///
/// ```ignore
/// ensure!(scanned <= max_size, ParseError::too_large_header(scanned, max_size));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

const HEXDUMP_WIDTH: usize = 16;

/// Renders `buf` as a classic hex dump, one line per 16 bytes.
///
/// Each line holds the offset, the hex bytes (with an extra gap after the
/// eighth byte) and the printable ASCII column:
///
/// ```text
/// 00000000  48 54 54 50 2f 31 2e 31  20 32 30 30 20 4f 4b 0d  |HTTP/1.1 200 OK.|
/// ```
pub fn hexdump(buf: &[u8]) -> Vec<String> {
    buf.chunks(HEXDUMP_WIDTH)
        .enumerate()
        .map(|(row, bytes)| {
            let mut line = String::with_capacity(80);
            let _ = write!(line, "{:08x}  ", row * HEXDUMP_WIDTH);
            for i in 0..HEXDUMP_WIDTH {
                match bytes.get(i) {
                    Some(b) => {
                        let _ = write!(line, "{b:02x} ");
                    }
                    None => line.push_str("   "),
                }
                if i == 7 {
                    line.push(' ');
                }
            }
            line.push_str(" |");
            for i in 0..HEXDUMP_WIDTH {
                match bytes.get(i) {
                    Some(b) if b.is_ascii_graphic() || *b == b' ' => line.push(char::from(*b)),
                    Some(_) => line.push('.'),
                    None => line.push(' '),
                }
            }
            line.push('|');
            line
        })
        .collect()
}

/// Dumps `buf` to the trace log, does nothing unless `TRACE` is enabled.
pub(crate) fn trace_hexdump(message: &str, buf: &[u8]) {
    if tracing::enabled!(tracing::Level::TRACE) {
        tracing::trace!("{}\n{}", message, hexdump(buf).join("\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexdump_single_line() {
        let lines = hexdump(b"HTTP/1.1 200 OK\r\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "00000000  48 54 54 50 2f 31 2e 31  20 32 30 30 20 4f 4b 0d  |HTTP/1.1 200 OK.|");
        assert!(lines[1].starts_with("00000010  0a "));
        assert!(lines[1].ends_with("|.               |"));
    }

    #[test]
    fn test_hexdump_empty() {
        assert!(hexdump(b"").is_empty());
    }
}
