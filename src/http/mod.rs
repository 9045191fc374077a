//! HTTP protocol framing.
//!
//! This module implements the HTTP/1.1 subset the blob-storage front end
//! speaks: request assembly on the way in, chunked response framing on the
//! way out.
//!
//! # Architecture
//!
//! - **`connection`**: the per-connection request state machine
//! - **`parser`**: incremental request-head and chunked-body parsing
//! - **`request`**: request representation (method, target, headers, body chunks)
//! - **`response`**: response descriptors with builder pattern
//! - **`writer`**: frames a response descriptor onto the socket
//!
//! # Connection state machine
//!
//! Each connection moves through:
//!
//! ```text
//!        ┌──────────────────┐
//!        │ AwaitingHeaders  │ ← wait for a request line + headers
//!        └──────┬───────────┘
//!               │ head parsed (unrecognized method → 400, close)
//!               ▼
//!        ┌──────────────────┐
//!        │  AssemblingBody  │ ← accumulate Content-Length or chunked body
//!        └──────┬───────────┘
//!               │ body complete
//!               ▼
//!        ┌──────────────────┐
//!        │    Dispatched    │ ← worker pool runs the storage capability;
//!        └──────┬───────────┘   early bytes here → 400, close
//!               │ response descriptor ready
//!               ▼
//!        ┌──────────────────┐
//!        │     Writing      │ ← head frame, body chunks, terminal frame
//!        └──────┬───────────┘
//!               │ terminal frame flushed
//!               ├─ keep-alive → AwaitingHeaders (same connection)
//!               └─ close → Closed
//! ```
//!
//! At most one request is in flight per connection; a second request that
//! begins before the prior response has been fully written is answered with
//! a 400 and the connection is closed after that response.

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

pub use connection::Connection;
pub use request::{Method, Request, RequestHead};
pub use response::{ResponseBuilder, ResponseDescriptor, StatusCode};
pub use writer::ResponseWriter;
