//! KISS framing: byte-stuffing and stream extraction.
//!
//! A KISS frame on the wire is `FEND | cmd | escaped_payload | FEND`, where
//! `FEND` delimits frames and `FESC` introduces an escape for a literal
//! `FEND` or `FESC` byte inside the payload.

pub const FEND: u8 = 0xC0;
pub const FESC: u8 = 0xDB;
pub const TFEND: u8 = 0xDC;
pub const TFESC: u8 = 0xDD;

/// KISS command byte for "data" on port 0 (the only port this engine uses).
pub const KISS_DATA_PORT0: u8 = 0x00;

/// Escape a payload for the wire: `FESC` -> `FESC TFESC`, `FEND` -> `FESC TFEND`.
pub fn escape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    for &b in payload {
        match b {
            FESC => out.extend([FESC, TFESC]),
            FEND => out.extend([FESC, TFEND]),
            _ => out.push(b),
        }
    }
    out
}

/// Reverse [`escape`]. An escape byte followed by anything other than
/// `TFEND`/`TFESC` is treated as a literal of that second byte (the source's
/// tolerant behavior for a malformed escape sequence).
pub fn unescape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    let mut i = 0;
    while i < payload.len() {
        let b = payload[i];
        if b == FESC && i + 1 < payload.len() {
            let next = payload[i + 1];
            out.push(match next {
                TFEND => FEND,
                TFESC => FESC,
                other => other,
            });
            i += 2;
        } else {
            out.push(b);
            i += 1;
        }
    }
    out
}

/// Wrap a data payload in a complete KISS frame for port 0.
pub fn wrap_data(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(FEND);
    out.push(KISS_DATA_PORT0);
    out.extend(escape(payload));
    out.push(FEND);
    out
}

/// Incrementally extracts complete KISS frames from arbitrary TCP read chunks.
///
/// Frames are delimited by `FEND`; garbage before the first `FEND` in a
/// batch is discarded, and an empty frame (two adjacent `FEND`s) is
/// silently skipped, per the source's two-pointer scan.
#[derive(Debug, Default)]
pub struct FrameExtractor {
    buf: Vec<u8>,
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of freshly-read bytes, returning zero or more complete,
    /// unescaped data frames (the KISS command byte stripped, data-type
    /// frames only).
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            let Some(start) = self.buf.iter().position(|&b| b == FEND) else {
                self.buf.clear();
                break;
            };
            let Some(end_rel) = self.buf[start + 1..].iter().position(|&b| b == FEND) else {
                if start > 0 {
                    self.buf.drain(..start);
                }
                break;
            };
            let end = start + 1 + end_rel;
            let frame = self.buf[start + 1..end].to_vec();
            self.buf.drain(..=end);

            if frame.is_empty() {
                continue;
            }
            let port_type = frame[0];
            if port_type & 0x0F != KISS_DATA_PORT0 {
                continue;
            }
            let data = unescape(&frame[1..]);
            if data.is_empty() {
                continue;
            }
            frames.push(data);
        }

        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_unescape_roundtrip() {
        let payload = vec![0x01, FEND, 0x02, FESC, 0x03, FEND, FESC];
        let escaped = escape(&payload);
        assert!(!escaped.contains(&FEND));
        assert_eq!(unescape(&escaped), payload);
    }

    #[test]
    fn unescape_tolerates_unknown_second_byte() {
        // FESC followed by something that isn't TFEND/TFESC is literal.
        let data = [FESC, 0x42];
        assert_eq!(unescape(&data), vec![0x42]);
    }

    #[test]
    fn extractor_recovers_frame_split_across_chunks() {
        let mut ex = FrameExtractor::new();
        let payload = b"hello ax25".to_vec();
        let frame = wrap_data(&payload);

        let (first, second) = frame.split_at(frame.len() / 2);
        assert!(ex.feed(first).is_empty());
        let frames = ex.feed(second);
        assert_eq!(frames, vec![payload]);
    }

    #[test]
    fn extractor_skips_empty_frame() {
        let mut ex = FrameExtractor::new();
        let mut stream = vec![FEND, FEND];
        stream.extend(wrap_data(b"abc"));
        let frames = ex.feed(&stream);
        assert_eq!(frames, vec![b"abc".to_vec()]);
    }

    #[test]
    fn extractor_discards_garbage_before_first_fend() {
        let mut ex = FrameExtractor::new();
        let mut stream = vec![0xAA, 0xBB, 0xCC];
        stream.extend(wrap_data(b"xyz"));
        let frames = ex.feed(&stream);
        assert_eq!(frames, vec![b"xyz".to_vec()]);
    }

    #[test]
    fn extractor_roundtrips_escaped_fend_in_payload() {
        let mut ex = FrameExtractor::new();
        let payload = vec![FEND, FESC, 0x00];
        let frame = wrap_data(&payload);
        let frames = ex.feed(&frame);
        assert_eq!(frames, vec![payload]);
    }
}
