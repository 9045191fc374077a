//! Request dispatch: the worker pool and the storage capability contract.
//!
//! Connections hand fully assembled requests to the [`Dispatcher`], which
//! routes them by method to the pluggable [`StorageService`] and converts
//! every outcome, success or failure, into a response descriptor for the
//! originating connection's writer.

pub mod pool;
pub mod storage;

pub use pool::{DispatchError, Dispatcher};
pub use storage::{FailureObserver, NoopObserver, StorageError, StorageResult, StorageService};
