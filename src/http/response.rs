use bytes::Bytes;
use std::collections::HashMap;

/// HTTP status codes this layer produces.
///
/// The front end itself only ever emits:
/// - `Ok` (200): capability success
/// - `BadRequest` (400): unrecognized method, malformed head, pipelining violation
/// - `InternalServerError` (500): dispatcher unavailable or capability failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

/// A complete response ready for framing: status, headers, and a finite
/// sequence of body chunks.
///
/// Consumed exactly once by the response writer, which emits the status and
/// header frame, one frame per body chunk, and the terminal frame.
#[derive(Debug)]
pub struct ResponseDescriptor {
    /// The HTTP status code
    pub status: StatusCode,
    /// Response headers as key-value pairs
    pub headers: HashMap<String, String>,
    /// Body chunks, written in order; may be empty
    pub body: Vec<Bytes>,
}

/// Builder for constructing response descriptors in a fluent style.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HashMap<String, String>,
    body: Vec<Bytes>,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Appends a body chunk.
    pub fn chunk(mut self, chunk: impl Into<Bytes>) -> Self {
        self.body.push(chunk.into());
        self
    }

    /// Replaces the body with the given chunks.
    pub fn body(mut self, body: Vec<Bytes>) -> Self {
        self.body = body;
        self
    }

    /// Builds the final descriptor.
    ///
    /// Every response must carry a Content-Type; `text/plain` is filled in
    /// when no other value was set.
    pub fn build(mut self) -> ResponseDescriptor {
        self.headers
            .entry("Content-Type".to_string())
            .or_insert_with(|| "text/plain".to_string());

        ResponseDescriptor {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl ResponseDescriptor {
    /// Creates a 200 OK response with a single body chunk.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::Ok).chunk(body).build()
    }

    /// Creates a 400 Bad Request response for a protocol violation.
    pub fn bad_request(reason: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::BadRequest)
            .chunk(reason)
            .build()
    }

    /// Creates a 500 Internal Server Error response.
    pub fn internal_error(reason: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::InternalServerError)
            .chunk(reason)
            .build()
    }

    /// Total body length across all chunks.
    pub fn body_len(&self) -> usize {
        self.body.iter().map(|c| c.len()).sum()
    }
}
