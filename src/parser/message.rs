//! Incremental HTTP/1.x message parser.
//!
//! Unlike the teacher's zero-copy `h1::request::H1Request<'buf, 'headers>` — which ties every
//! parsed field to the lifetime of a single input slice and, by its own admission, cannot survive
//! a request split across TCP segments — `HttpMessage` owns an accumulating
//! [`crate::buffer::Buffer`] and resumes parsing across any number of `parse()` calls. This is
//! the `B` component: a request/response reaches `ParserState::Complete` the same way regardless
//! of how the caller chopped up the bytes that produced it.

use crate::buffer::Buffer;

use super::header::{Header, HeaderList};
use super::method::Method;
use super::version::Version;
use super::{ParseError, ParseResult};

/// Whether a [`HttpMessage`] is being parsed as a request or a response; the two share framing
/// and header machinery but differ in their start line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// `METHOD target HTTP/version`
    Request,
    /// `HTTP/version code reason`
    Response,
}

/// The parser's state, advanced one step at a time as bytes become available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// No bytes consumed yet.
    Initialized,
    /// The request/status line has been parsed.
    LineRcvd,
    /// All headers, including the terminating blank line, have been parsed.
    HeadersComplete,
    /// Body bytes are being accumulated per the resolved framing.
    RcvingBody,
    /// The message is fully parsed; further bytes are a caller error.
    Complete,
}

#[derive(Debug, Clone, Copy)]
enum ChunkState {
    Size,
    Data(u64),
    ChunkCrlf,
    Trailer,
}

/// An incrementally-parsed HTTP/1.x request or response.
///
/// Construct with [`HttpMessage::request`] or [`HttpMessage::response`], then feed bytes to
/// [`parse`](Self::parse) as they arrive. `state()` reaches [`ParserState::Complete`] once the
/// full message (headers plus framed body) has been consumed.
#[derive(Debug)]
pub struct HttpMessage {
    kind: Kind,
    state: ParserState,
    method: Option<Method>,
    url: Option<Vec<u8>>,
    version: Option<Version>,
    code: Option<u16>,
    reason: Option<Vec<u8>>,
    headers: HeaderList,
    body: Vec<u8>,
    chunked: bool,
    gzip: bool,
    keep_alive: bool,
    content_length: Option<u64>,
    buffer: Buffer,
    body_remaining: u64,
    chunk_state: ChunkState,
}

impl HttpMessage {
    /// A fresh request parser.
    pub fn request() -> Self {
        Self::new(Kind::Request)
    }

    /// A fresh response parser.
    pub fn response() -> Self {
        Self::new(Kind::Response)
    }

    fn new(kind: Kind) -> Self {
        HttpMessage {
            kind,
            state: ParserState::Initialized,
            method: None,
            url: None,
            version: None,
            code: None,
            reason: None,
            headers: HeaderList::new(),
            body: Vec::new(),
            chunked: false,
            gzip: false,
            keep_alive: false,
            content_length: None,
            buffer: Buffer::new(4096),
            body_remaining: 0,
            chunk_state: ChunkState::Size,
        }
    }

    /// Whether this is a request or response parser.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The parser's current state.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// The parsed method, once the start line has been received. `Request` only.
    pub fn method(&self) -> Option<Method> {
        self.method
    }

    /// The parsed request target, once the start line has been received. `Request` only.
    pub fn url(&self) -> Option<&[u8]> {
        self.url.as_deref()
    }

    /// The parsed HTTP version, once the start line has been received.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// The parsed status code, once the start line has been received. `Response` only.
    pub fn code(&self) -> Option<u16> {
        self.code
    }

    /// The parsed reason phrase, once the start line has been received. `Response` only.
    pub fn reason(&self) -> Option<&[u8]> {
        self.reason.as_deref()
    }

    /// The headers received so far, in order.
    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    /// The body bytes accumulated so far (dechunked, if `Transfer-Encoding: chunked`). Stored
    /// compressed if `Content-Encoding: gzip`; decoding is the caller's concern.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether `Transfer-Encoding: chunked` was present (and won framing over `Content-Length`,
    /// if both were present).
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// Whether `Content-Encoding: gzip` was present.
    pub fn is_gzip(&self) -> bool {
        self.gzip
    }

    /// Whether the connection should be kept alive after this message, per the `Connection`
    /// header and the message's HTTP version default.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Case-insensitive header presence check.
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.has(name)
    }

    /// Case-insensitive header lookup; returns the first matching value.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers.get(name)
    }

    /// Feeds `chunk` into the parser, advancing `state()` as far as the accumulated bytes allow.
    /// Tolerates partial chunks: if `chunk` ends mid-header or mid-body, the remainder is
    /// buffered and completed by a subsequent call.
    pub fn parse(&mut self, chunk: &[u8]) -> ParseResult<()> {
        if self.state == ParserState::Complete {
            if chunk.is_empty() {
                return Ok(());
            }
            return Err(ParseError::AlreadyComplete);
        }

        self.buffer.extend(chunk);
        while self.advance()? {}
        Ok(())
    }

    /// Deterministically reserializes the message as parsed (or as mutated by a plugin).
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 256);
        match self.kind {
            Kind::Request => {
                let method = self.method.map(|m| m.to_string()).unwrap_or_default();
                let url = self
                    .url
                    .as_deref()
                    .map(|u| String::from_utf8_lossy(u).into_owned())
                    .unwrap_or_default();
                let version = self
                    .version
                    .unwrap_or(Version::H1_1)
                    .to_string();
                out.extend_from_slice(format!("{method} {url} {version}\r\n").as_bytes());
            }
            Kind::Response => {
                let version = self
                    .version
                    .unwrap_or(Version::H1_1)
                    .to_string();
                let code = self.code.unwrap_or(200);
                let reason = self
                    .reason
                    .as_deref()
                    .map(|r| String::from_utf8_lossy(r).into_owned())
                    .unwrap_or_default();
                out.extend_from_slice(format!("{version} {code} {reason}\r\n").as_bytes());
            }
        }
        self.headers.write_to(&mut out);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    /// Advances the state machine by one step. Returns `Ok(true)` if progress was made (the
    /// caller should call again), `Ok(false)` if the buffered bytes are insufficient to progress
    /// further (the caller should wait for more input).
    fn advance(&mut self) -> ParseResult<bool> {
        match self.state {
            ParserState::Initialized => self.advance_start_line(),
            ParserState::LineRcvd => self.advance_headers(),
            ParserState::HeadersComplete => {
                self.resolve_framing()?;
                Ok(true)
            }
            ParserState::RcvingBody => self.advance_body(),
            ParserState::Complete => Ok(false),
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let slice = self.buffer.as_slice();
        let idx = slice.windows(2).position(|w| w == b"\r\n")?;
        let line = slice[..idx].to_vec();
        self.buffer.mark_read(idx + 2);
        Some(line)
    }

    fn advance_start_line(&mut self) -> ParseResult<bool> {
        let line = match self.take_line() {
            Some(l) => l,
            None => return Ok(false),
        };
        match self.kind {
            Kind::Request => self.parse_request_line(&line)?,
            Kind::Response => self.parse_status_line(&line)?,
        }
        self.state = ParserState::LineRcvd;
        Ok(true)
    }

    fn parse_request_line(&mut self, line: &[u8]) -> ParseResult<()> {
        let (method_tok, rest) = super::cursor::split_token(line);
        let method = Method::from_bytes(method_tok)?;
        let (target_tok, rest) = super::cursor::split_token(rest);
        if target_tok.is_empty() {
            return Err(ParseError::Target);
        }
        let (version_tok, _) = super::cursor::split_token(rest);
        let version = Version::from_bytes(version_tok)?;

        self.method = Some(method);
        self.url = Some(target_tok.to_vec());
        self.version = Some(version);
        Ok(())
    }

    fn parse_status_line(&mut self, line: &[u8]) -> ParseResult<()> {
        let (version_tok, rest) = super::cursor::split_token(line);
        let version = Version::from_bytes(version_tok)?;
        let (code_tok, reason) = super::cursor::split_token(rest);
        let code: u16 = std::str::from_utf8(code_tok)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(ParseError::StatusCode)?;

        self.version = Some(version);
        self.code = Some(code);
        self.reason = Some(reason.to_vec());
        Ok(())
    }

    fn advance_headers(&mut self) -> ParseResult<bool> {
        let line = match self.take_line() {
            Some(l) => l,
            None => return Ok(false),
        };
        if line.is_empty() {
            self.state = ParserState::HeadersComplete;
            return Ok(true);
        }

        let colon = line.iter().position(|&b| b == b':').ok_or(ParseError::HeaderName)?;
        let name = &line[..colon];
        if name.is_empty() || name.iter().any(|&b| b == b' ' || b == b'\t') {
            return Err(ParseError::HeaderName);
        }
        let mut value = &line[colon + 1..];
        while matches!(value.first(), Some(b' ') | Some(b'\t')) {
            value = &value[1..];
        }

        self.headers.push(Header::new(name.to_vec(), value.to_vec()));
        Ok(true)
    }

    fn resolve_framing(&mut self) -> ParseResult<()> {
        self.chunked = self
            .headers
            .get_all("Transfer-Encoding")
            .any(|v| contains_token_ci(v, b"chunked"));

        if let Some(raw) = self.headers.get("Content-Length") {
            let text = std::str::from_utf8(raw).map_err(|_| ParseError::ContentLength)?;
            self.content_length =
                Some(text.trim().parse::<u64>().map_err(|_| ParseError::ContentLength)?);
        }

        self.gzip = self
            .headers
            .get("Content-Encoding")
            .is_some_and(|v| v.eq_ignore_ascii_case(b"gzip"));

        self.keep_alive = self.compute_keep_alive();

        if self.chunked {
            // §4.B: both present ⇒ chunked wins.
            self.chunk_state = ChunkState::Size;
            self.state = ParserState::RcvingBody;
        } else if let Some(len) = self.content_length {
            if len == 0 {
                self.state = ParserState::Complete;
            } else {
                self.body_remaining = len;
                self.state = ParserState::RcvingBody;
            }
        } else {
            self.state = ParserState::Complete;
        }
        Ok(())
    }

    fn compute_keep_alive(&self) -> bool {
        if let Some(v) = self.headers.get("Connection") {
            if v.eq_ignore_ascii_case(b"close") {
                return false;
            }
            if v.eq_ignore_ascii_case(b"keep-alive") {
                return true;
            }
        }
        self.version.is_some_and(|v| v.keep_alive_by_default())
    }

    fn advance_body(&mut self) -> ParseResult<bool> {
        if self.chunked {
            self.advance_chunked_body()
        } else {
            let available = self.buffer.remaining() as u64;
            if available == 0 {
                return Ok(false);
            }
            let take = available.min(self.body_remaining) as usize;
            if take == 0 {
                return Ok(false);
            }
            self.body.extend_from_slice(&self.buffer.as_slice()[..take]);
            self.buffer.mark_read(take);
            self.body_remaining -= take as u64;
            if self.body_remaining == 0 {
                self.state = ParserState::Complete;
            }
            Ok(true)
        }
    }

    fn advance_chunked_body(&mut self) -> ParseResult<bool> {
        match self.chunk_state {
            ChunkState::Size => {
                let line = match self.take_line() {
                    Some(l) => l,
                    None => return Ok(false),
                };
                let size_tok = line.split(|&b| b == b';').next().unwrap_or(&[]);
                let size = parse_hex(size_tok).ok_or(ParseError::ChunkSize)?;
                self.chunk_state = if size == 0 {
                    ChunkState::Trailer
                } else {
                    ChunkState::Data(size)
                };
                Ok(true)
            }
            ChunkState::Data(remaining) => {
                let available = self.buffer.remaining() as u64;
                if available == 0 {
                    return Ok(false);
                }
                let take = available.min(remaining) as usize;
                if take == 0 {
                    return Ok(false);
                }
                self.body.extend_from_slice(&self.buffer.as_slice()[..take]);
                self.buffer.mark_read(take);
                let left = remaining - take as u64;
                self.chunk_state = if left == 0 {
                    ChunkState::ChunkCrlf
                } else {
                    ChunkState::Data(left)
                };
                Ok(true)
            }
            ChunkState::ChunkCrlf => {
                if self.buffer.remaining() < 2 {
                    return Ok(false);
                }
                self.buffer.mark_read(2);
                self.chunk_state = ChunkState::Size;
                Ok(true)
            }
            ChunkState::Trailer => {
                let line = match self.take_line() {
                    Some(l) => l,
                    None => return Ok(false),
                };
                if line.is_empty() {
                    self.state = ParserState::Complete;
                }
                Ok(true)
            }
        }
    }
}

fn parse_hex(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut n: u64 = 0;
    for &b in bytes {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return None,
        } as u64;
        n = n.checked_mul(16)?.checked_add(digit)?;
    }
    Some(n)
}

fn contains_token_ci(header_value: &[u8], token: &[u8]) -> bool {
    header_value
        .split(|&b| b == b',')
        .map(|part| {
            let trimmed = part
                .iter()
                .position(|&b| b != b' ' && b != b'\t')
                .map(|start| &part[start..])
                .unwrap_or(&[]);
            let end = trimmed
                .iter()
                .rposition(|&b| b != b' ' && b != b'\t')
                .map(|end| end + 1)
                .unwrap_or(0);
            &trimmed[..end]
        })
        .any(|part| part.eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_request_without_body() {
        let mut msg = HttpMessage::request();
        msg.parse(b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n")
            .unwrap();

        assert_eq!(msg.state(), ParserState::Complete);
        assert_eq!(msg.method(), Some(Method::Get));
        assert_eq!(msg.url(), Some(&b"/index.html"[..]));
        assert_eq!(msg.version(), Some(Version::H1_1));
        assert_eq!(msg.header("host"), Some(&b"example.com"[..]));
        assert!(msg.keep_alive());
    }

    #[test]
    fn tolerates_arbitrary_split_points() {
        let whole = b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        for split in 0..whole.len() {
            let mut msg = HttpMessage::request();
            msg.parse(&whole[..split]).unwrap();
            msg.parse(&whole[split..]).unwrap();
            assert_eq!(msg.state(), ParserState::Complete, "split at {split}");
            assert_eq!(msg.body(), b"hello");
        }
    }

    #[test]
    fn chunked_wins_over_content_length() {
        let mut msg = HttpMessage::request();
        msg.parse(
            b"POST /x HTTP/1.1\r\nContent-Length: 999\r\nTransfer-Encoding: chunked\r\n\r\n\
              5\r\nhello\r\n0\r\n\r\n",
        )
        .unwrap();

        assert!(msg.is_chunked());
        assert_eq!(msg.state(), ParserState::Complete);
        assert_eq!(msg.body(), b"hello");
    }

    #[test]
    fn dechunks_multiple_chunks_across_feeds() {
        let mut msg = HttpMessage::request();
        msg.parse(b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n")
            .unwrap();
        msg.parse(b"4\r\nWiki\r\n").unwrap();
        msg.parse(b"5\r\npedia\r\n").unwrap();
        msg.parse(b"0\r\n\r\n").unwrap();

        assert_eq!(msg.state(), ParserState::Complete);
        assert_eq!(msg.body(), b"Wikipedia");
    }

    #[test]
    fn parses_status_line_and_reason_with_spaces() {
        let mut msg = HttpMessage::response();
        msg.parse(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .unwrap();

        assert_eq!(msg.code(), Some(404));
        assert_eq!(msg.reason(), Some(&b"Not Found"[..]));
        assert_eq!(msg.state(), ParserState::Complete);
    }

    #[test]
    fn rejects_bytes_fed_after_complete() {
        let mut msg = HttpMessage::request();
        msg.parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(msg.parse(b"garbage").is_err());
    }

    #[test]
    fn build_reserializes_request() {
        let mut msg = HttpMessage::request();
        msg.parse(b"GET /a HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
        assert_eq!(msg.build(), b"GET /a HTTP/1.1\r\nHost: h\r\n\r\n".to_vec());
    }

    #[test]
    fn duplicate_headers_are_preserved() {
        let mut msg = HttpMessage::response();
        msg.parse(b"HTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\n\r\n")
            .unwrap();
        let values: Vec<&[u8]> = msg.headers().get_all("set-cookie").collect();
        assert_eq!(values, vec![&b"a=1"[..], &b"b=2"[..]]);
    }
}
