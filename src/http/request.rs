//! Request decoding from an untrusted byte stream.
//!
//! # Responsibilities
//! - Accumulate the request head under a byte and header-count budget
//! - Validate request-line and header framing (httparse)
//! - Extract method, target, protocol, headers and declared body length
//! - Read exactly the declared body, starting with bytes already buffered
//!
//! # Design Decisions
//! - Arriving bytes are scanned once for the end of the request line and the
//!   blank line; httparse runs only at those two points, so a head trickled
//!   in byte by byte costs linear time
//! - A `Transfer-Encoding` header disables body capture (no chunked decoding)
//! - The declared body length only sizes the initial buffer up to a cap

use std::collections::BTreeMap;
use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::HandlerConfig;
use crate::http::uri::{encode_form, RequestUri, UriError};

/// Bytes requested from the stream per read while looking for the head.
const READ_CHUNK: usize = 4096;

/// Largest up-front allocation for a body, whatever length is declared.
const BODY_PREALLOC_LIMIT: usize = 64 * 1024;

/// Framing failures while decoding a request head.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("read request: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed before request")]
    ConnectionClosed,
    #[error("unexpected EOF in request head")]
    TruncatedHead,
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),
    #[error("request has more than {0} headers")]
    TooManyHeaders(usize),
    #[error("malformed request: {0}")]
    Malformed(httparse::Error),
    #[error("invalid request target: {0}")]
    Target(#[from] UriError),
    #[error("bad Content-Length {0:?}")]
    BadContentLength(String),
}

/// One decoded request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRequest {
    method: String,
    raw_target: String,
    uri: RequestUri,
    minor_version: u8,
    headers: BTreeMap<String, Vec<String>>,
    content_length: Option<u64>,
}

impl DecodedRequest {
    fn from_parsed(req: &httparse::Request<'_, '_>) -> Result<Self, ParseError> {
        // Complete parses always carry all three request-line parts.
        let method = req.method.unwrap_or_default().to_string();
        let raw_target = req.path.unwrap_or_default().to_string();
        let minor_version = req.version.unwrap_or(1);

        let uri = RequestUri::parse(&method, &raw_target)?;

        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for header in req.headers.iter() {
            headers
                .entry(header.name.to_ascii_lowercase())
                .or_default()
                .push(String::from_utf8_lossy(header.value).into_owned());
        }

        let content_length = if headers.contains_key("transfer-encoding") {
            None
        } else {
            parse_content_length(headers.get("content-length"))?
        };

        Ok(Self {
            method,
            raw_target,
            uri,
            minor_version,
            headers,
            content_length,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request-target exactly as sent.
    pub fn raw_target(&self) -> &str {
        &self.raw_target
    }

    pub fn uri(&self) -> &RequestUri {
        &self.uri
    }

    pub fn proto(&self) -> &'static str {
        if self.minor_version == 0 {
            "HTTP/1.0"
        } else {
            "HTTP/1.1"
        }
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Host from the `Host` header, falling back to the target's authority.
    pub fn host(&self) -> Option<&str> {
        self.header("host").or_else(|| self.uri.host())
    }

    /// Declared body length; 0 when absent or when transfer-coded.
    pub fn content_length(&self) -> u64 {
        self.content_length.unwrap_or(0)
    }

    /// ASCII rendering of the request for forensic dumps.
    ///
    /// A POST gets a blank section followed by its form: the url-encoded
    /// `body` (when the content type says so) merged with the query.
    pub fn dump(&self, body: &[u8]) -> String {
        let mut lines = vec![
            format!("{} {} {}", self.method, self.raw_target, self.proto()),
            format!("Host: {}", self.host().unwrap_or_default()),
        ];
        for (name, values) in &self.headers {
            if name == "host" {
                continue;
            }
            lines.extend(values.iter().map(|value| format!("{name}: {value}")));
        }

        if self.method == "POST" {
            let body = if self.is_form_body() {
                String::from_utf8_lossy(body)
            } else {
                Default::default()
            };
            lines.push("\n".to_string());
            lines.push(encode_form([body.as_ref()].into_iter().chain(self.uri.raw_query())));
        }
        lines.join("\n")
    }

    fn is_form_body(&self) -> bool {
        self.header("content-type")
            .and_then(|value| value.split(';').next())
            .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
    }
}

fn parse_content_length(values: Option<&Vec<String>>) -> Result<Option<u64>, ParseError> {
    let Some(values) = values else {
        return Ok(None);
    };

    let first = values[0].trim();
    if values.iter().any(|v| v.trim() != first) {
        return Err(ParseError::BadContentLength(values.join(", ")));
    }
    if first.is_empty() || !first.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::BadContentLength(first.to_string()));
    }
    first
        .parse()
        .map(Some)
        .map_err(|_| ParseError::BadContentLength(first.to_string()))
}

/// Where the head scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// No new parse point in the buffered bytes.
    Incomplete,
    /// The request line just ended; enough to reject garbage early.
    RequestLine,
    /// A blank line follows a header or request line.
    HeadEnd,
}

/// Incremental search for the parse points of a request head.
///
/// Leading empty lines are skipped the way httparse skips them. Bytes before
/// `next` are never looked at again.
#[derive(Debug, Default)]
struct HeadScan {
    next: usize,
    start: Option<usize>,
    line_seen: bool,
}

impl HeadScan {
    fn advance(&mut self, buf: &[u8]) -> Scan {
        let start = match self.start {
            Some(start) => start,
            None => match buf[self.next..].iter().position(|b| !matches!(b, b'\r' | b'\n')) {
                Some(offset) => {
                    let start = self.next + offset;
                    self.start = Some(start);
                    start
                }
                None => {
                    self.next = buf.len();
                    return Scan::Incomplete;
                }
            },
        };

        let mut i = self.next.max(start);
        while i < buf.len() {
            if buf[i] == b'\n' {
                if !self.line_seen {
                    // Stay on this newline: it may also open the blank line.
                    self.line_seen = true;
                    self.next = i;
                    return Scan::RequestLine;
                }
                match (buf.get(i + 1), buf.get(i + 2)) {
                    (Some(b'\n'), _) | (Some(b'\r'), Some(b'\n')) => {
                        self.next = i + 1;
                        return Scan::HeadEnd;
                    }
                    (None, _) | (Some(b'\r'), None) => {
                        self.next = i;
                        return Scan::Incomplete;
                    }
                    _ => {}
                }
            }
            i += 1;
        }
        self.next = buf.len();
        Scan::Incomplete
    }
}

/// Reads one request from a stream it borrows for the exchange.
pub struct RequestReader<'c, C> {
    conn: &'c mut C,
    buf: Vec<u8>,
    scan: HeadScan,
    max_header_bytes: usize,
    max_headers: usize,
}

impl<'c, C: AsyncRead + Unpin> RequestReader<'c, C> {
    pub fn new(conn: &'c mut C, config: &HandlerConfig) -> Self {
        Self {
            conn,
            buf: Vec::with_capacity(READ_CHUNK),
            scan: HeadScan::default(),
            max_header_bytes: config.max_header_bytes,
            max_headers: config.max_headers,
        }
    }

    /// Read until a complete head is buffered and decode it.
    pub async fn read_head(&mut self) -> Result<DecodedRequest, ParseError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            while self.scan.advance(&self.buf) != Scan::Incomplete {
                if let Some((request, consumed)) = self.try_parse()? {
                    self.buf.drain(..consumed);
                    return Ok(request);
                }
            }

            let room = self.max_header_bytes.saturating_sub(self.buf.len());
            if room == 0 {
                return Err(ParseError::HeadTooLarge(self.max_header_bytes));
            }

            let n = self.conn.read(&mut chunk[..room.min(READ_CHUNK)]).await?;
            if n == 0 {
                return Err(if self.buf.is_empty() {
                    ParseError::ConnectionClosed
                } else {
                    ParseError::TruncatedHead
                });
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn try_parse(&self) -> Result<Option<(DecodedRequest, usize)>, ParseError> {
        let mut headers = vec![httparse::EMPTY_HEADER; self.max_headers];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(&self.buf) {
            Ok(httparse::Status::Complete(consumed)) => {
                Ok(Some((DecodedRequest::from_parsed(&req)?, consumed)))
            }
            Ok(httparse::Status::Partial) => Ok(None),
            Err(httparse::Error::TooManyHeaders) => Err(ParseError::TooManyHeaders(self.max_headers)),
            Err(e) => Err(ParseError::Malformed(e)),
        }
    }

    /// Read exactly `len` body bytes. Consumes the reader, releasing the
    /// stream whatever the outcome.
    pub async fn read_body(self, len: u64) -> io::Result<Vec<u8>> {
        let wanted = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "body length overflows usize"))?;

        let mut body = Vec::with_capacity(wanted.min(BODY_PREALLOC_LIMIT));
        let buffered = self.buf.len().min(wanted);
        body.extend_from_slice(&self.buf[..buffered]);

        let remaining = (wanted - buffered) as u64;
        if remaining > 0 {
            self.conn.take(remaining).read_to_end(&mut body).await?;
        }

        if body.len() < wanted {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("body ended after {} of {} bytes", body.len(), wanted),
            ));
        }
        Ok(body)
    }
}
