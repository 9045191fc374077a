use bytes::Bytes;
use std::collections::HashMap;

/// HTTP request methods recognized by the front end.
///
/// The set is closed on purpose: the storage capability only serves these
/// four verbs, and any other token on the request line is a protocol
/// violation (400), never forwarded to the capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a blob
    Get,
    /// POST - Store a blob
    Post,
    /// DELETE - Delete a blob
    Delete,
    /// HEAD - Like GET but metadata only
    Head,
}

impl Method {
    /// Parses a request-line method token.
    ///
    /// Returns `None` for any token outside the recognized set, including
    /// standard methods this service does not serve (PUT, TRACE, ...).
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "DELETE" => Some(Method::Delete),
            "HEAD" => Some(Method::Head),
            _ => None,
        }
    }

    /// The canonical wire token for this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parsed request line and headers, before any body bytes arrive.
///
/// Header keys are normalized to lowercase at parse time so lookups are
/// case-insensitive; duplicate headers keep the last value seen.
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// The HTTP method
    pub method: Method,
    /// The request target (e.g., "/blob/42")
    pub target: String,
    /// HTTP version (typically "HTTP/1.1")
    pub version: String,
    /// Request headers, keys lowercased, last value wins
    pub headers: HashMap<String, String>,
}

impl RequestHead {
    /// Retrieves a header value by name, case-insensitive.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    /// Determines whether the connection should remain open after the response.
    ///
    /// HTTP/1.1 defaults to keep-alive; `Connection: close` opts out.
    pub fn keep_alive(&self) -> bool {
        self.header("connection")
            .map(|v| !v.eq_ignore_ascii_case("close"))
            .unwrap_or(true)
    }
}

/// A fully assembled request, ready for dispatch.
///
/// The body is the finite sequence of byte chunks accumulated by the
/// connection state machine, in arrival order. It is not restartable:
/// `take_body` moves the chunks out exactly once.
#[derive(Debug)]
pub struct Request {
    head: RequestHead,
    body: Vec<Bytes>,
}

impl Request {
    pub fn new(head: RequestHead, body: Vec<Bytes>) -> Self {
        Self { head, body }
    }

    pub fn method(&self) -> Method {
        self.head.method
    }

    pub fn target(&self) -> &str {
        &self.head.target
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.head.header(key)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.head.headers
    }

    /// See [`RequestHead::keep_alive`].
    pub fn keep_alive(&self) -> bool {
        self.head.keep_alive()
    }

    /// The body chunks, in arrival order.
    pub fn body_chunks(&self) -> &[Bytes] {
        &self.body
    }

    /// Moves the body chunks out of the request. Subsequent calls return
    /// an empty sequence.
    pub fn take_body(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.body)
    }

    /// Total body length across all chunks.
    pub fn body_len(&self) -> usize {
        self.body.iter().map(|c| c.len()).sum()
    }
}
