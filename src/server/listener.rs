use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::http::Connection;
use crate::tls::{Role, SessionFactory, TrustConfig};

/// Responder-side TLS wiring for the acceptor.
#[derive(Clone)]
pub struct ResponderTls {
    pub factory: Arc<SessionFactory>,
    pub trust: TrustConfig,
}

/// Owns the listening socket and the set of live connections.
///
/// `start` binds and spawns the accept loop; every accepted socket gets an
/// optional responder-role TLS handshake and then one connection task,
/// tracked so `shutdown` can close them all. Both operations are
/// idempotent.
pub struct Acceptor {
    listen_addr: String,
    dispatcher: Dispatcher,
    tls: Option<ResponderTls>,
    shutdown_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Acceptor {
    pub fn new(
        listen_addr: impl Into<String>,
        dispatcher: Dispatcher,
        tls: Option<ResponderTls>,
    ) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            dispatcher,
            tls,
            shutdown_tx: None,
            handle: None,
            local_addr: None,
        }
    }

    /// Binds the listening socket and spawns the accept loop.
    ///
    /// Returns the bound address (useful when configured with port 0).
    /// Calling `start` again on a running acceptor is a no-op.
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        if let Some(addr) = self.local_addr {
            if self.handle.is_some() {
                return Ok(addr);
            }
        }

        let listener = TcpListener::bind(&self.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = self.dispatcher.clone();
        let tls = self.tls.clone();

        self.handle = Some(tokio::spawn(async move {
            accept_loop(listener, dispatcher, tls, shutdown_rx).await;
        }));
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        Ok(local_addr)
    }

    /// Stops accepting and closes all tracked connections.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        self.local_addr = None;
        info!("Acceptor shut down");
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Dispatcher,
    tls: Option<ResponderTls>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    let dispatcher = dispatcher.clone();
                    let tls = tls.clone();
                    connections.spawn(async move {
                        serve_connection(socket, peer, dispatcher, tls).await;
                    });
                }
                Err(e) => {
                    // Transient accept failures must not take the service down
                    warn!(error = %e, "Failed to accept connection");
                }
            },

            _ = shutdown_rx.changed() => break,
        }
    }

    // Closing tracked connections transitively cancels their in-progress
    // request assembly.
    connections.shutdown().await;
}

async fn serve_connection(
    socket: TcpStream,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    tls: Option<ResponderTls>,
) {
    match tls {
        Some(tls) => {
            let session = match tls
                .factory
                .session(Role::Responder, &tls.trust, &peer.ip().to_string())
            {
                Ok(session) => session,
                Err(e) => {
                    error!(error = %e, "Failed to create TLS session");
                    return;
                }
            };

            // A failed handshake closes the socket with no framed response;
            // the peer observes only the closed transport.
            let stream = match session.handshake(socket).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(%peer, error = %e, "TLS handshake failed");
                    return;
                }
            };

            let mut conn = Connection::new(stream, dispatcher);
            if let Err(e) = conn.run().await {
                error!("Connection error from {}: {}", peer, e);
            }
        }
        None => {
            let mut conn = Connection::new(socket, dispatcher);
            if let Err(e) = conn.run().await {
                error!("Connection error from {}: {}", peer, e);
            }
        }
    }
}
