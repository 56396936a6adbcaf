//! Delimiter-based message framing shared by every TCP transport.
//!
//! A logical message is an opaque byte payload terminated by a single
//! delimiter byte (default `*`). There is no length prefix, no escaping and
//! no checksum: framing integrity depends entirely on payload fields never
//! containing the delimiter byte. Field-level encoding inside a payload is
//! comma-separated UTF-8 text (`field1,field2,...`).
//!
//! Senders use [`frame`] to terminate outgoing payloads; receivers feed raw
//! socket reads into a [`Deframer`] which reassembles complete messages
//! across arbitrary read boundaries.

/// The delimiter byte used by every transport unless configured otherwise.
pub const DEFAULT_DELIMITER: u8 = b'*';

/// Terminate a payload with the delimiter byte.
///
/// If the payload already ends with the delimiter it is returned unchanged,
/// so double-framing an already-framed message is harmless.
pub fn frame(payload: &[u8], delimiter: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.extend_from_slice(payload);
    if out.last() != Some(&delimiter) {
        out.push(delimiter);
    }
    out
}

/// Strip trailing delimiter bytes and decode the payload as UTF-8.
///
/// Used by the field-level parsers: subscriber callbacks receive the full
/// delimited message, so every parser tolerates the trailing delimiter.
pub fn frame_text(data: &[u8], delimiter: u8) -> Result<&str, std::str::Utf8Error> {
    let mut end = data.len();
    while end > 0 && data[end - 1] == delimiter {
        end -= 1;
    }
    std::str::from_utf8(&data[..end])
}

/// Incremental frame reassembler for one byte stream.
///
/// Buffers incoming bytes and yields everything before each delimiter as one
/// complete message, retaining the remainder (including a partial trailing
/// message) for the next read. Empty messages (zero bytes between two
/// delimiters) are silently dropped.
#[derive(Debug)]
pub struct Deframer {
    delimiter: u8,
    buf: Vec<u8>,
}

impl Deframer {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter, buf: Vec::new() }
    }

    /// Append raw bytes from the socket to the internal buffer.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete message, without its delimiter.
    ///
    /// Returns `None` when no complete message is buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            let pos = self.buf.iter().position(|&b| b == self.delimiter)?;
            let mut msg: Vec<u8> = self.buf.drain(..=pos).collect();
            msg.pop(); // the delimiter itself
            if !msg.is_empty() {
                return Some(msg);
            }
        }
    }

    /// Number of bytes currently buffered (partial trailing message).
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(d: &mut Deframer) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(f) = d.next_frame() {
            out.push(f);
        }
        out
    }

    #[test]
    fn frame_appends_delimiter() {
        assert_eq!(frame(b"AAPL,172.53", b'*'), b"AAPL,172.53*");
    }

    #[test]
    fn frame_is_idempotent() {
        assert_eq!(frame(b"AAPL,172.53*", b'*'), b"AAPL,172.53*");
    }

    #[test]
    fn round_trip() {
        let mut d = Deframer::new(b'*');
        d.push(&frame(b"AAPL,172.53,1696180200.0", b'*'));
        assert_eq!(drain(&mut d), vec![b"AAPL,172.53,1696180200.0".to_vec()]);
    }

    #[test]
    fn reassembles_across_arbitrary_reads() {
        // The same byte stream, split at every possible point, must yield the
        // same message sequence as one contiguous read.
        let stream = b"AAPL,100*MSFT,200*SPY,3";
        for split in 0..stream.len() {
            let mut d = Deframer::new(b'*');
            d.push(&stream[..split]);
            let mut got = drain(&mut d);
            d.push(&stream[split..]);
            got.extend(drain(&mut d));
            assert_eq!(got, vec![b"AAPL,100".to_vec(), b"MSFT,200".to_vec()], "split at {split}");
            assert_eq!(d.buffered(), 6); // "SPY,3" plus nothing complete
        }
    }

    #[test]
    fn partial_tail_retained() {
        let mut d = Deframer::new(b'*');
        d.push(b"AAPL,1");
        assert!(d.next_frame().is_none());
        d.push(b"00*");
        assert_eq!(d.next_frame(), Some(b"AAPL,100".to_vec()));
    }

    #[test]
    fn empty_messages_dropped() {
        let mut d = Deframer::new(b'*');
        d.push(b"**A***B**");
        assert_eq!(drain(&mut d), vec![b"A".to_vec(), b"B".to_vec()]);
    }

    #[test]
    fn frame_text_strips_trailing_delimiters() {
        assert_eq!(frame_text(b"AAPL,55*", b'*').unwrap(), "AAPL,55");
        assert_eq!(frame_text(b"AAPL,55", b'*').unwrap(), "AAPL,55");
        assert_eq!(frame_text(b"AAPL,55**", b'*').unwrap(), "AAPL,55");
    }
}
