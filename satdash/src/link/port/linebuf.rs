//! Internal buffer for line-oriented ports.

use super::LinkError;
use std::io;

/// Size of the internal buffer. This is also the longest line accepted.
pub const LINEBUF_SIZE: usize = 4096;

/// Buffer used internally by ports with an underlying byte stream
/// to split the received bytes into text lines.
pub struct LineBuf {
    /// Internal buffer. Valid data (possibly none) is
    /// in a slice delimited by `start` and `end`.
    buf: [u8; LINEBUF_SIZE],
    /// Start offset of valid data in `buf`.
    start: usize,
    /// End offset of valid data in `buf`.
    end: usize,
    /// Set after an overlong line was dropped. Everything up to and
    /// including the next newline belongs to that line and is discarded.
    skipping: bool,
}

impl LineBuf {
    pub fn new() -> LineBuf {
        LineBuf {
            buf: [0; LINEBUF_SIZE],
            start: 0,
            end: 0,
            skipping: false,
        }
    }

    pub fn empty(&self) -> bool {
        self.start == self.end
    }

    fn size(&self) -> usize {
        self.end - self.start
    }

    fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Drops `len` bytes of pending data, up to the end of a line.
    fn consume(&mut self, len: usize) {
        debug_assert!(len <= self.size());
        self.start = (self.start + len).min(self.end);
        if self.start == self.end {
            self.flush();
        }
    }

    /// Drops all pending data, including a partial line.
    pub fn flush(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Slides pending data to the front so a refill gets the most room.
    fn compact(&mut self) {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
    }

    /// Refills the buffer as much as possible from an object implementing `io::Read`.
    /// A zero-sized read means the other end is gone.
    pub fn refill<T: io::Read>(&mut self, reader: &mut T) -> Result<(), LinkError> {
        self.compact();
        match reader.read(&mut self.buf[self.end..]) {
            Ok(size) => {
                if size > 0 {
                    self.end += size;
                    Ok(())
                } else {
                    Err(LinkError::Disconnected)
                }
            }
            Err(e) => match e.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Err(LinkError::NotReady),
                io::ErrorKind::TimedOut => Err(LinkError::NotReady),
                _ => Err(LinkError::IO(e)),
            },
        }
    }

    /// Extracts the next complete line, if there is one. The newline and any
    /// trailing whitespace (including `\r`) are stripped.
    ///
    /// If the buffer fills up without a newline the partial line is dropped
    /// and `LineTooLong` is returned once; the remainder of that line is
    /// then silently skipped.
    pub fn take_line(&mut self) -> Result<Option<String>, LinkError> {
        loop {
            match self.data().iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    if self.skipping {
                        self.consume(pos + 1);
                        self.skipping = false;
                        continue;
                    }
                    let line = decode(&self.data()[..pos]);
                    self.consume(pos + 1);
                    return line.map(Some);
                }
                None => {
                    if self.size() < LINEBUF_SIZE {
                        return Ok(None);
                    }
                    self.flush();
                    if self.skipping {
                        return Ok(None);
                    }
                    self.skipping = true;
                    return Err(LinkError::LineTooLong(LINEBUF_SIZE));
                }
            }
        }
    }

    /// Extracts whatever is left as a final, unterminated line. Used when
    /// the stream has ended.
    pub fn take_rest(&mut self) -> Result<Option<String>, LinkError> {
        if self.skipping || self.empty() {
            self.skipping = false;
            self.flush();
            return Ok(None);
        }
        let line = decode(self.data());
        self.flush();
        line.map(Some)
    }
}

fn decode(raw: &[u8]) -> Result<String, LinkError> {
    let text = std::str::from_utf8(raw)?;
    Ok(text.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(buf: &mut LineBuf, bytes: &[u8]) {
        let mut src = bytes;
        buf.refill(&mut src).unwrap();
    }

    #[test]
    fn splits_lines_and_strips_trailing_whitespace() {
        let mut buf = LineBuf::new();
        fill(&mut buf, b"panditas\r\n12.5  \npartial");
        assert_eq!(buf.take_line().unwrap().as_deref(), Some("panditas"));
        assert_eq!(buf.take_line().unwrap().as_deref(), Some("12.5"));
        assert_eq!(buf.take_line().unwrap(), None);
        assert_eq!(buf.data(), b"partial");
        assert_eq!(buf.take_rest().unwrap().as_deref(), Some("partial"));
        assert!(buf.empty());
    }

    #[test]
    fn invalid_utf8_consumes_the_line() {
        let mut buf = LineBuf::new();
        fill(&mut buf, b"\xff\xfe\nok\n");
        assert!(matches!(buf.take_line(), Err(LinkError::Decode(_))));
        assert_eq!(buf.take_line().unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn overlong_line_is_reported_once_and_skipped() {
        let mut buf = LineBuf::new();
        let long = vec![b'x'; LINEBUF_SIZE];
        fill(&mut buf, &long);
        assert!(matches!(buf.take_line(), Err(LinkError::LineTooLong(_))));
        fill(&mut buf, b"xxxx\nnext\n");
        assert_eq!(buf.take_line().unwrap().as_deref(), Some("next"));
    }

    #[test]
    fn partial_line_survives_compaction() {
        let mut buf = LineBuf::new();
        fill(&mut buf, b"panditas\n17");
        assert_eq!(buf.take_line().unwrap().as_deref(), Some("panditas"));
        fill(&mut buf, b"03\n");
        assert_eq!(buf.take_line().unwrap().as_deref(), Some("1703"));
        assert!(buf.empty());
    }

    #[test]
    fn empty_read_is_disconnect() {
        let mut buf = LineBuf::new();
        let mut src: &[u8] = b"";
        assert!(matches!(buf.refill(&mut src), Err(LinkError::Disconnected)));
    }
}
