//! The worker pool that routes assembled requests to the storage capability.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatch::storage::{FailureObserver, StorageError, StorageService};
use crate::http::request::{Method, Request};
use crate::http::response::{ResponseBuilder, ResponseDescriptor, StatusCode};

/// Submission failure: the pool is not accepting work.
///
/// Raised synchronously, before the capability is ever consulted. The
/// connection answers it with a framed 500.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchError;

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dispatcher is not accepting requests")
    }
}

impl std::error::Error for DispatchError {}

struct Job {
    request: Request,
    reply: oneshot::Sender<ResponseDescriptor>,
}

enum PoolState {
    Created,
    Running { tx: mpsc::Sender<Job> },
    ShutDown,
}

struct Inner {
    storage: Arc<dyn StorageService>,
    observer: Arc<dyn FailureObserver>,
    worker_count: usize,
    queue_depth: usize,
    state: Mutex<PoolState>,
    // Set at shutdown; workers answer queued-but-not-started jobs with a 500
    // instead of invoking the capability.
    draining: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Fixed-size worker pool dispatching requests to the storage capability.
///
/// Lifecycle: created (rejecting work) → `start()` (accepting) →
/// `shutdown()` (rejecting again, drains in flight, joins workers). Both
/// transitions are idempotent. Cloning shares the same pool.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(
        storage: Arc<dyn StorageService>,
        observer: Arc<dyn FailureObserver>,
        worker_count: usize,
        queue_depth: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                observer,
                worker_count: worker_count.max(1),
                queue_depth: queue_depth.max(1),
                state: Mutex::new(PoolState::Created),
                draining: AtomicBool::new(false),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Transitions the pool to accepting work and spawns the workers.
    ///
    /// Calling `start` on a running pool is a no-op; starting a pool that
    /// was already shut down is an error.
    pub fn start(&self) -> anyhow::Result<()> {
        let mut state = self.inner.state.lock().unwrap();
        match &*state {
            PoolState::Running { .. } => return Ok(()),
            PoolState::ShutDown => anyhow::bail!("dispatcher was already shut down"),
            PoolState::Created => {}
        }

        let (tx, rx) = mpsc::channel::<Job>(self.inner.queue_depth);
        let rx = Arc::new(AsyncMutex::new(rx));

        let mut workers = self.inner.workers.lock().unwrap();
        for id in 0..self.inner.worker_count {
            let rx = Arc::clone(&rx);
            let inner = Arc::clone(&self.inner);
            workers.push(tokio::spawn(async move {
                worker_loop(id, inner, rx).await;
            }));
        }

        *state = PoolState::Running { tx };
        info!(workers = self.inner.worker_count, "Dispatcher started");
        Ok(())
    }

    /// Enqueues an assembled request.
    ///
    /// Returns the receiver the response descriptor will arrive on, or
    /// `DispatchError` if the pool has not been started or has begun
    /// shutting down. The availability check happens before the capability
    /// is touched.
    pub async fn submit(
        &self,
        request: Request,
    ) -> Result<oneshot::Receiver<ResponseDescriptor>, DispatchError> {
        let tx = {
            let state = self.inner.state.lock().unwrap();
            match &*state {
                PoolState::Running { tx } if !self.inner.draining.load(Ordering::Acquire) => {
                    tx.clone()
                }
                _ => return Err(DispatchError),
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            request,
            reply: reply_tx,
        };

        tx.send(job).await.map_err(|_| DispatchError)?;
        Ok(reply_rx)
    }

    /// Stops accepting work, fails queued-but-not-started jobs, lets
    /// in-flight capability calls complete, then joins the workers.
    ///
    /// Safe to call more than once and on a pool that was never started.
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            match &*state {
                PoolState::Running { .. } => {
                    self.inner.draining.store(true, Ordering::Release);
                    // Dropping the sender closes the queue once the workers
                    // have drained it.
                    *state = PoolState::ShutDown;
                }
                PoolState::Created => {
                    *state = PoolState::ShutDown;
                    return;
                }
                PoolState::ShutDown => return,
            }
        }

        let workers = {
            let mut workers = self.inner.workers.lock().unwrap();
            std::mem::take(&mut *workers)
        };
        for handle in workers {
            let _ = handle.await;
        }
        info!("Dispatcher shut down");
    }
}

async fn worker_loop(id: usize, inner: Arc<Inner>, rx: Arc<AsyncMutex<mpsc::Receiver<Job>>>) {
    debug!(worker = id, "Dispatcher worker started");
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };

        let Some(job) = job else {
            break;
        };

        let descriptor = if inner.draining.load(Ordering::Acquire) {
            // Queued before shutdown but never started; fail it without
            // invoking the capability.
            ResponseDescriptor::internal_error("service is shutting down")
        } else {
            execute(&inner, job.request).await
        };

        // The connection may already be gone; nothing to do about it.
        let _ = job.reply.send(descriptor);
    }
    debug!(worker = id, "Dispatcher worker exiting");
}

/// Routes one request to the capability and converts the outcome into a
/// response descriptor. Exactly one attempt; retries are the capability's
/// business.
async fn execute(inner: &Inner, mut request: Request) -> ResponseDescriptor {
    let method = request.method();
    let target = request.target().to_string();

    let result = match method {
        Method::Get => inner.storage.get(&mut request).await,
        Method::Post => inner.storage.post(&mut request).await,
        Method::Delete => inner.storage.delete(&mut request).await,
        Method::Head => inner.storage.head(&mut request).await,
    };

    match result {
        Ok(outcome) => {
            debug!(method = %method, target = %target, "Capability call succeeded");
            ResponseBuilder::new(StatusCode::Ok)
                .header(
                    "Content-Type",
                    outcome.content_type.unwrap_or_else(|| "text/plain".to_string()),
                )
                .body(outcome.body)
                .build()
        }
        Err(err @ StorageError::Operation(_)) => {
            warn!(method = %method, target = %target, error = %err, "Capability reported a failure");
            ResponseDescriptor::internal_error(err.to_string())
        }
        Err(err @ StorageError::Unexpected(_)) => {
            warn!(method = %method, target = %target, error = %err, "Unexpected capability failure");
            inner.observer.unexpected_failure(method, &target, &err);
            ResponseDescriptor::internal_error(err.to_string())
        }
    }
}
