//! Object boundary scanning
//!
//! The server writes JSON objects back to back (`{...}{...}`) with no
//! length prefix or delimiter, and a single read may hold several objects,
//! part of one, or both. [`FrameScanner`] walks the bytes once, tracking
//! brace depth together with string and escape state so that braces inside
//! string literals never count, and reports where each top-level segment
//! ends. Unfinished segments stay in the caller's buffer until more bytes
//! arrive.

/// Default upper bound on a single buffered segment (1 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Where the scanner currently is relative to the segment being built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ScanState {
    /// Between segments
    #[default]
    Idle,
    /// Inside a top-level object
    Object {
        depth: usize,
        in_string: bool,
        escaped: bool,
    },
    /// Bytes at depth 0 that are not the start of an object
    Junk,
}

/// What the scanner found in the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Skip this many leading whitespace bytes before the next segment
    Skip(usize),
    /// A segment occupies the first `len` bytes of the buffer
    Segment { len: usize },
    /// The buffer holds only part of a segment
    Incomplete,
}

/// Incremental scanner for concatenated JSON objects
///
/// Scanning is resumable: bytes already examined are not examined again
/// when the buffer grows, so feeding a large object in many small reads
/// stays linear.
#[derive(Debug, Clone, Default)]
pub struct FrameScanner {
    state: ScanState,
    /// Offset of the next unexamined byte in the caller's buffer
    cursor: usize,
}

impl FrameScanner {
    /// Create a scanner positioned between segments
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget any partial segment
    pub fn reset(&mut self) {
        self.state = ScanState::Idle;
        self.cursor = 0;
    }

    /// True when no partial segment is being tracked
    pub fn is_idle(&self) -> bool {
        self.state == ScanState::Idle && self.cursor == 0
    }

    /// Look for the next boundary in `buf`.
    ///
    /// `buf` must start where the previous segment (or skip) ended; the
    /// caller removes the reported bytes before calling again.
    pub fn scan(&mut self, buf: &[u8]) -> Boundary {
        if self.state == ScanState::Idle {
            let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
            if skip > 0 {
                return Boundary::Skip(skip);
            }
        }

        while self.cursor < buf.len() {
            let byte = buf[self.cursor];
            match &mut self.state {
                ScanState::Idle => {
                    self.state = if byte == b'{' {
                        ScanState::Object {
                            depth: 1,
                            in_string: false,
                            escaped: false,
                        }
                    } else {
                        ScanState::Junk
                    };
                }
                ScanState::Junk => {
                    if byte == b'{' {
                        // The junk ends where the next object starts
                        return self.finish(self.cursor);
                    }
                }
                ScanState::Object {
                    depth,
                    in_string,
                    escaped,
                } => {
                    if *in_string {
                        if *escaped {
                            *escaped = false;
                        } else if byte == b'\\' {
                            *escaped = true;
                        } else if byte == b'"' {
                            *in_string = false;
                        }
                    } else {
                        match byte {
                            b'"' => *in_string = true,
                            b'{' => *depth += 1,
                            b'}' => {
                                *depth -= 1;
                                if *depth == 0 {
                                    return self.finish(self.cursor + 1);
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            self.cursor += 1;
        }

        Boundary::Incomplete
    }

    /// Length of whatever partial segment remains at end of stream, if it
    /// holds anything besides whitespace
    pub fn remainder(&mut self, buf: &[u8]) -> Option<usize> {
        self.reset();
        if buf.iter().all(|b| b.is_ascii_whitespace()) {
            None
        } else {
            Some(buf.len())
        }
    }

    fn finish(&mut self, len: usize) -> Boundary {
        self.reset();
        Boundary::Segment { len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the scanner over a complete buffer, collecting segments
    fn segments(input: &str) -> (Vec<String>, String) {
        let mut scanner = FrameScanner::new();
        let mut buf = input.as_bytes().to_vec();
        let mut out = Vec::new();
        loop {
            match scanner.scan(&buf) {
                Boundary::Skip(n) => {
                    buf.drain(..n);
                }
                Boundary::Segment { len } => {
                    let seg: Vec<u8> = buf.drain(..len).collect();
                    out.push(String::from_utf8(seg).unwrap());
                }
                Boundary::Incomplete => break,
            }
        }
        (out, String::from_utf8(buf).unwrap())
    }

    #[test]
    fn test_single_object() {
        let (segs, rest) = segments(r#"{"cmd":"PONG"}"#);
        assert_eq!(segs, vec![r#"{"cmd":"PONG"}"#]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_concatenated_objects_with_whitespace() {
        let (segs, rest) = segments("{\"a\":1}  \n{\"b\":{\"c\":2}}\r\n");
        assert_eq!(segs, vec![r#"{"a":1}"#, r#"{"b":{"c":2}}"#]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_braces_inside_strings_are_not_boundaries() {
        let input = r#"{"msg":"a}{b","x":"{{"}{"cmd":"HB"}"#;
        let (segs, _) = segments(input);
        assert_eq!(segs, vec![r#"{"msg":"a}{b","x":"{{"}"#, r#"{"cmd":"HB"}"#]);
    }

    #[test]
    fn test_escaped_quotes_do_not_end_strings() {
        let input = r#"{"msg":"say \"}{\" and \\"}{"cmd":"X"}"#;
        let (segs, _) = segments(input);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0], r#"{"msg":"say \"}{\" and \\"}"#);
        assert_eq!(segs[1], r#"{"cmd":"X"}"#);
    }

    #[test]
    fn test_partial_object_is_kept() {
        let (segs, rest) = segments(r#"{"cmd":"PONG"}{"cmd":"HB","#);
        assert_eq!(segs, vec![r#"{"cmd":"PONG"}"#]);
        assert_eq!(rest, r#"{"cmd":"HB","#);
    }

    #[test]
    fn test_resumes_across_reads() {
        let mut scanner = FrameScanner::new();
        let mut buf = br#"{"msg":"a}"#.to_vec();
        assert_eq!(scanner.scan(&buf), Boundary::Incomplete);
        assert!(!scanner.is_idle());

        buf.extend_from_slice(br#"{","cmd":"X"}"#);
        let boundary = scanner.scan(&buf);
        assert_eq!(boundary, Boundary::Segment { len: buf.len() });
        assert!(scanner.is_idle());
    }

    #[test]
    fn test_junk_before_object_is_its_own_segment() {
        let (segs, rest) = segments(r#"garbage{"cmd":"X"}"#);
        assert_eq!(segs, vec!["garbage", r#"{"cmd":"X"}"#]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_remainder_at_eof() {
        let mut scanner = FrameScanner::new();
        let buf = br#"{"cmd":"#;
        assert_eq!(scanner.scan(buf), Boundary::Incomplete);
        assert_eq!(scanner.remainder(buf), Some(buf.len()));
        assert!(scanner.is_idle());

        assert_eq!(scanner.remainder(b" \n "), None);
    }
}
