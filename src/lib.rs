//! blobfront - front-end request layer of a distributed blob-storage service
//!
//! Accepts inbound connections, optionally terminates TLS, frames HTTP/1.1
//! request/response traffic, and dispatches assembled requests to a
//! pluggable storage capability with at most one request in flight per
//! connection.

pub mod config;
pub mod dispatch;
pub mod http;
pub mod server;
pub mod tls;
