//! Byte cursor over a growable buffer, used to tokenize request/status lines and header lines.
//!
//! Adapted from the teacher's `raw_request::RawRequest`, but holds an owned position into a
//! borrowed slice rather than repeatedly re-slicing the underlying buffer, so it composes with
//! the incremental parser's accumulating [`crate::buffer::Buffer`] instead of requiring the
//! whole message to already be a contiguous `&'static`-lifetime slice.

/// A cursor over `&[u8]` that tracks how far it has advanced, without consuming the underlying
/// slice's lifetime the way the teacher's `RawRequest` iterator did.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    inner: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Wraps `slice` for tokenizing from the start.
    pub fn new(slice: &'a [u8]) -> Self {
        Cursor { inner: slice, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes remaining to be consumed.
    pub fn remaining(&self) -> &'a [u8] {
        &self.inner[self.pos..]
    }

    /// Whether the cursor has reached the end of the slice.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.inner.len()
    }

    /// The next byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.inner.get(self.pos).copied()
    }

    /// Consumes and returns the next byte.
    pub fn next(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Consumes `n` bytes, clamped to the remaining length, returning what was actually
    /// consumed.
    pub fn advance(&mut self, n: usize) -> &'a [u8] {
        let end = (self.pos + n).min(self.inner.len());
        let slice = &self.inner[self.pos..end];
        self.pos = end;
        slice
    }

    /// If `remaining()` starts with `tag`, consumes it and returns `true`.
    pub fn consume_tag(&mut self, tag: &[u8]) -> bool {
        if self.remaining().starts_with(tag) {
            self.pos += tag.len();
            true
        } else {
            false
        }
    }

    /// Consumes bytes while `predicate` holds, returning the consumed slice (possibly empty).
    pub fn take_while<F>(&mut self, mut predicate: F) -> &'a [u8]
    where
        F: FnMut(u8) -> bool,
    {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if !predicate(b) {
                break;
            }
            self.pos += 1;
        }
        &self.inner[start..self.pos]
    }

    /// Consumes bytes up to (not including) the first occurrence of `tag`, and also consumes
    /// `tag` itself. Returns the slice before `tag` if found.
    pub fn take_until_tag(&mut self, tag: &[u8]) -> Option<&'a [u8]> {
        let rest = self.remaining();
        let idx = rest
            .windows(tag.len().max(1))
            .position(|window| window == tag)?;
        let slice = &rest[..idx];
        self.pos += idx + tag.len();
        Some(slice)
    }
}

/// Splits `line` (without trailing CRLF) into a whitespace-separated token and the remainder,
/// skipping any leading `SP`/`HTAB` (RFC 9110 §5.6.3 `OWS`).
pub fn split_token(line: &[u8]) -> (&[u8], &[u8]) {
    let mut cursor = Cursor::new(line);
    cursor.take_while(|b| b == b' ' || b == b'\t');
    let token = cursor.take_while(|b| b != b' ' && b != b'\t');
    cursor.take_while(|b| b == b' ' || b == b'\t');
    (token, cursor.remaining())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_until_tag_finds_crlf() {
        let mut cursor = Cursor::new(b"GET / HTTP/1.1\r\nHost: x\r\n");
        let line = cursor.take_until_tag(b"\r\n").unwrap();
        assert_eq!(line, b"GET / HTTP/1.1");
        assert_eq!(cursor.remaining(), b"Host: x\r\n");
    }

    #[test]
    fn split_token_skips_single_space() {
        let (method, rest) = split_token(b"GET / HTTP/1.1");
        assert_eq!(method, b"GET");
        assert_eq!(rest, b"/ HTTP/1.1");
    }

    #[test]
    fn take_until_tag_returns_none_when_absent() {
        let mut cursor = Cursor::new(b"no newline here");
        assert_eq!(cursor.take_until_tag(b"\r\n"), None);
    }
}
