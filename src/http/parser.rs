use crate::http::request::{Method, RequestHead};
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
    InvalidChunk,
    Incomplete,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            ParseError::InvalidRequest => "malformed request line",
            ParseError::InvalidMethod => "unrecognized method",
            ParseError::InvalidHeader => "malformed header",
            ParseError::InvalidContentLength => "invalid Content-Length",
            ParseError::InvalidChunk => "malformed chunk framing",
            ParseError::Incomplete => "incomplete request",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ParseError {}

/// How many body bytes to expect after the head, and framed how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLength {
    /// No body expected
    None,
    /// Exactly this many bytes follow the head
    Length(usize),
    /// Chunked transfer encoding, terminated by a zero-size chunk
    Chunked,
}

/// Parses the request line and headers from the front of `buf`.
///
/// Returns the parsed head and the number of bytes consumed (through the
/// blank line). `Incomplete` means more bytes are needed; any other error is
/// a protocol violation the caller answers with a 400.
pub fn parse_request_head(buf: &[u8]) -> Result<(RequestHead, usize), ParseError> {
    // Look for header/body separator
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let header_bytes = &buf[..headers_end];

    let headers_str = std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let target = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    let method = Method::from_token(method_str).ok_or(ParseError::InvalidMethod)?;

    // Headers: keys lowercased so lookups are case-insensitive, last value wins
    let mut headers = HashMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;

        headers.insert(
            key.trim().to_ascii_lowercase(),
            value.trim().to_string(),
        );
    }

    let head = RequestHead {
        method,
        target: target.to_string(),
        version: version.to_string(),
        headers,
    };

    Ok((head, headers_end + 4))
}

/// Determines the body framing declared by the head.
///
/// `Transfer-Encoding: chunked` wins over Content-Length; a Content-Length
/// that does not parse as an integer is a protocol violation.
pub fn body_length(head: &RequestHead) -> Result<BodyLength, ParseError> {
    if let Some(te) = head.header("transfer-encoding") {
        if te.eq_ignore_ascii_case("chunked") {
            return Ok(BodyLength::Chunked);
        }
    }

    match head.header("content-length") {
        Some(v) => {
            let len: usize = v.parse().map_err(|_| ParseError::InvalidContentLength)?;
            if len == 0 {
                Ok(BodyLength::None)
            } else {
                Ok(BodyLength::Length(len))
            }
        }
        None => Ok(BodyLength::None),
    }
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// One step of chunked-body decoding.
#[derive(Debug, PartialEq, Eq)]
pub enum ChunkProgress {
    /// A complete data chunk was decoded
    Chunk(Bytes),
    /// The zero-size terminal chunk was consumed; the body is complete
    Done,
    /// More bytes are needed
    NeedMore,
}

/// Incremental decoder for `Transfer-Encoding: chunked` request bodies.
///
/// Feed it the connection's read buffer; it consumes complete chunk frames
/// from the front and leaves partial frames untouched. Trailers are not
/// supported: the terminal chunk must be followed directly by CRLF.
#[derive(Debug, Default)]
pub struct ChunkedDecoder;

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<ChunkProgress, ParseError> {
        // Chunk-size line
        let Some(line_end) = buf.windows(2).position(|w| w == b"\r\n") else {
            return Ok(ChunkProgress::NeedMore);
        };

        let size_str =
            std::str::from_utf8(&buf[..line_end]).map_err(|_| ParseError::InvalidChunk)?;
        // Chunk extensions (";...") are tolerated and ignored
        let size_str = size_str.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16).map_err(|_| ParseError::InvalidChunk)?;

        // A size that overflows the frame arithmetic can never be satisfied
        let frame_len = size
            .checked_add(line_end + 4)
            .ok_or(ParseError::InvalidChunk)?;
        if buf.len() < frame_len {
            return Ok(ChunkProgress::NeedMore);
        }

        if &buf[line_end + 2 + size..frame_len] != b"\r\n" {
            return Err(ParseError::InvalidChunk);
        }

        let mut frame = buf.split_to(frame_len);
        if size == 0 {
            return Ok(ChunkProgress::Done);
        }

        let data = frame.split_off(line_end + 2).split_to(size).freeze();
        Ok(ChunkProgress::Chunk(data))
    }
}
