//! The contract between the front end and the blob storage capability.
//!
//! The dispatcher routes each assembled request to one of the per-method
//! entry points below. How blobs are actually stored, replicated, or looked
//! up is entirely the capability's business; this layer only needs a body,
//! an optional content type, or a tagged failure back.

use async_trait::async_trait;
use bytes::Bytes;

use crate::http::request::{Method, Request};

/// A successful capability result.
///
/// `content_type` defaults to `text/plain` when the capability leaves it
/// unset.
#[derive(Debug, Default)]
pub struct StorageResult {
    /// Response body chunks, in order
    pub body: Vec<Bytes>,
    /// Content type for the response, if the capability wants to override
    /// the default
    pub content_type: Option<String>,
}

impl StorageResult {
    /// Convenience constructor for a single-chunk body.
    pub fn from_body(body: impl Into<Bytes>) -> Self {
        Self {
            body: vec![body.into()],
            content_type: None,
        }
    }
}

/// Failure kinds a capability call can produce.
///
/// The split is deliberate and closed: `Operation` is an expected
/// business-level failure (blob missing, quota exceeded, ...); `Unexpected`
/// is a defect surfacing from the capability. Both map to a 500 response,
/// but only `Unexpected` is reported to the failure observer.
#[derive(Debug)]
pub enum StorageError {
    /// An expected operation failure reported by the capability
    Operation(String),
    /// A defect; reported to the observer in addition to the 500
    Unexpected(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Operation(msg) => write!(f, "operation failed: {}", msg),
            StorageError::Unexpected(msg) => write!(f, "unexpected failure: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// The pluggable blob storage capability.
///
/// One entry point per recognized method; the dispatcher picks the entry
/// point from the request's method. Implementations may block on I/O; they
/// run on dispatcher workers, never on connection tasks.
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn get(&self, request: &mut Request) -> Result<StorageResult, StorageError>;
    async fn post(&self, request: &mut Request) -> Result<StorageResult, StorageError>;
    async fn delete(&self, request: &mut Request) -> Result<StorageResult, StorageError>;
    async fn head(&self, request: &mut Request) -> Result<StorageResult, StorageError>;
}

/// Receives notifications about unexpected capability failures.
///
/// Required to exist, not to do anything; production deployments hook
/// metrics or alerting in here.
pub trait FailureObserver: Send + Sync {
    fn unexpected_failure(&self, method: Method, target: &str, error: &StorageError);
}

/// An observer that discards every notification.
pub struct NoopObserver;

impl FailureObserver for NoopObserver {
    fn unexpected_failure(&self, _method: Method, _target: &str, _error: &StorageError) {}
}
