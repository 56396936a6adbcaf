//! Fixed-size symbol utilities for shared-memory compatibility.
//!
//! Price slots use `[u8; 16]` for symbols so they can live in a fixed-layout
//! shared segment without heap allocation. This module provides helpers to
//! convert between `&str` and the fixed-size representation.

/// Length of the fixed symbol buffer used in every shm-resident slot.
pub const SYMBOL_LEN: usize = 16;

/// Write a UTF-8 symbol string into a fixed `[u8; SYMBOL_LEN]` buffer.
///
/// The string is copied byte-for-byte and the remaining bytes are zero-filled.
/// If `s` is longer than `SYMBOL_LEN`, it is silently truncated.
#[inline]
pub fn symbol_to_bytes(s: &str) -> [u8; SYMBOL_LEN] {
    let mut buf = [0u8; SYMBOL_LEN];
    let len = s.len().min(SYMBOL_LEN);
    buf[..len].copy_from_slice(&s.as_bytes()[..len]);
    buf
}

/// Read a symbol from a fixed `[u8; SYMBOL_LEN]` buffer.
///
/// Returns the string up to the first null byte (or the full buffer if no
/// null is found). Non-UTF-8 content yields `""`.
#[inline]
pub fn symbol_from_bytes(buf: &[u8; SYMBOL_LEN]) -> &str {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(SYMBOL_LEN);
    std::str::from_utf8(&buf[..end]).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let buf = symbol_to_bytes("AAPL");
        assert_eq!(symbol_from_bytes(&buf), "AAPL");
    }

    #[test]
    fn empty_symbol() {
        let buf = symbol_to_bytes("");
        assert_eq!(symbol_from_bytes(&buf), "");
    }

    #[test]
    fn truncation() {
        let long = "A".repeat(SYMBOL_LEN + 4);
        let buf = symbol_to_bytes(&long);
        assert_eq!(symbol_from_bytes(&buf).len(), SYMBOL_LEN);
    }
}
