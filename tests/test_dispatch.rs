//! Tests for the dispatcher lifecycle and error-to-status mapping.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use blobfront::dispatch::{
    DispatchError, Dispatcher, FailureObserver, NoopObserver, StorageError, StorageResult,
    StorageService,
};
use blobfront::http::request::{Method, Request, RequestHead};
use blobfront::http::response::StatusCode;

fn make_request(method: Method, target: &str) -> Request {
    Request::new(
        RequestHead {
            method,
            target: target.to_string(),
            version: "HTTP/1.1".to_string(),
            headers: HashMap::new(),
        },
        Vec::new(),
    )
}

/// Echoes the request's method name, like the simplest storage capability.
struct EchoStorage;

impl EchoStorage {
    fn echo(request: &Request) -> Result<StorageResult, StorageError> {
        Ok(StorageResult::from_body(request.method().as_str()))
    }
}

#[async_trait]
impl StorageService for EchoStorage {
    async fn get(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        Self::echo(request)
    }
    async fn post(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        Self::echo(request)
    }
    async fn delete(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        Self::echo(request)
    }
    async fn head(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        Self::echo(request)
    }
}

/// Fails by target: "/expected" raises an operation failure, "/defect"
/// an unexpected one.
struct FailingStorage;

impl FailingStorage {
    fn fail(request: &Request) -> Result<StorageResult, StorageError> {
        match request.target() {
            "/expected" => Err(StorageError::Operation("blob not available".into())),
            "/defect" => Err(StorageError::Unexpected("index corrupted".into())),
            _ => Ok(StorageResult::from_body("ok")),
        }
    }
}

#[async_trait]
impl StorageService for FailingStorage {
    async fn get(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        Self::fail(request)
    }
    async fn post(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        Self::fail(request)
    }
    async fn delete(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        Self::fail(request)
    }
    async fn head(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        Self::fail(request)
    }
}

/// Blocks each call until the test releases it through the gate channel.
struct GatedStorage {
    gate: Mutex<mpsc::Receiver<()>>,
}

#[async_trait]
impl StorageService for GatedStorage {
    async fn get(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        self.gate.lock().await.recv().await;
        Ok(StorageResult::from_body(request.method().as_str()))
    }
    async fn post(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        self.get(request).await
    }
    async fn delete(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        self.get(request).await
    }
    async fn head(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        self.get(request).await
    }
}

struct CountingObserver {
    count: AtomicUsize,
}

impl FailureObserver for CountingObserver {
    fn unexpected_failure(&self, _method: Method, _target: &str, _error: &StorageError) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

fn echo_dispatcher() -> Dispatcher {
    Dispatcher::new(Arc::new(EchoStorage), Arc::new(NoopObserver), 2, 16)
}

#[tokio::test]
async fn test_submit_before_start_fails_without_touching_capability() {
    let dispatcher = echo_dispatcher();

    let result = dispatcher.submit(make_request(Method::Get, "/")).await;
    assert!(matches!(result, Err(DispatchError)));
}

#[tokio::test]
async fn test_started_dispatcher_serves_the_same_request() {
    let dispatcher = echo_dispatcher();

    assert!(dispatcher.submit(make_request(Method::Get, "/")).await.is_err());

    dispatcher.start().unwrap();
    let reply = dispatcher
        .submit(make_request(Method::Get, "/"))
        .await
        .unwrap();
    let response = reply.await.unwrap();

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.body.concat(), b"GET");
    assert_eq!(response.headers.get("Content-Type").unwrap(), "text/plain");

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_each_method_routes_to_its_entry_point() {
    let dispatcher = echo_dispatcher();
    dispatcher.start().unwrap();

    for method in [Method::Get, Method::Post, Method::Delete, Method::Head] {
        let reply = dispatcher.submit(make_request(method, "/")).await.unwrap();
        let response = reply.await.unwrap();

        assert_eq!(response.status, StatusCode::Ok);
        assert_eq!(response.body.concat(), method.as_str().as_bytes());
    }

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let dispatcher = echo_dispatcher();
    dispatcher.start().unwrap();
    dispatcher.start().unwrap();

    let reply = dispatcher
        .submit(make_request(Method::Get, "/"))
        .await
        .unwrap();
    assert_eq!(reply.await.unwrap().status, StatusCode::Ok);

    dispatcher.shutdown().await;
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_expected_failure_maps_to_500_without_observer() {
    let observer = Arc::new(CountingObserver {
        count: AtomicUsize::new(0),
    });
    let dispatcher = Dispatcher::new(Arc::new(FailingStorage), observer.clone(), 1, 16);
    dispatcher.start().unwrap();

    let reply = dispatcher
        .submit(make_request(Method::Get, "/expected"))
        .await
        .unwrap();
    let response = reply.await.unwrap();

    assert_eq!(response.status, StatusCode::InternalServerError);
    assert_eq!(observer.count.load(Ordering::SeqCst), 0);

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_unexpected_failure_maps_to_500_and_notifies_observer_once() {
    let observer = Arc::new(CountingObserver {
        count: AtomicUsize::new(0),
    });
    let dispatcher = Dispatcher::new(Arc::new(FailingStorage), observer.clone(), 1, 16);
    dispatcher.start().unwrap();

    let reply = dispatcher
        .submit(make_request(Method::Get, "/defect"))
        .await
        .unwrap();
    let response = reply.await.unwrap();

    assert_eq!(response.status, StatusCode::InternalServerError);
    assert_eq!(observer.count.load(Ordering::SeqCst), 1);

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_submit_after_shutdown_fails() {
    let dispatcher = echo_dispatcher();
    dispatcher.start().unwrap();
    dispatcher.shutdown().await;

    let result = dispatcher.submit(make_request(Method::Get, "/")).await;
    assert!(matches!(result, Err(DispatchError)));
}

#[tokio::test]
async fn test_shutdown_fails_queued_work_and_drains_in_flight_work() {
    let (gate_tx, gate_rx) = mpsc::channel(4);
    let storage = Arc::new(GatedStorage {
        gate: Mutex::new(gate_rx),
    });
    // Single worker so the second request stays queued
    let dispatcher = Dispatcher::new(storage, Arc::new(NoopObserver), 1, 16);
    dispatcher.start().unwrap();

    let in_flight = dispatcher
        .submit(make_request(Method::Get, "/a"))
        .await
        .unwrap();
    // Let the worker pick it up
    tokio::time::sleep(Duration::from_millis(50)).await;

    let queued = dispatcher
        .submit(make_request(Method::Get, "/b"))
        .await
        .unwrap();

    let shutdown = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.shutdown().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Release the in-flight call; it completes normally
    gate_tx.send(()).await.unwrap();

    let in_flight_response = in_flight.await.unwrap();
    assert_eq!(in_flight_response.status, StatusCode::Ok);

    // The queued-but-not-started request is failed without running
    let queued_response = queued.await.unwrap();
    assert_eq!(queued_response.status, StatusCode::InternalServerError);

    shutdown.await.unwrap();
}
