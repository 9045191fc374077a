use std::sync::Arc;

use async_trait::async_trait;

use blobfront::config::Config;
use blobfront::dispatch::{
    Dispatcher, NoopObserver, StorageError, StorageResult, StorageService,
};
use blobfront::http::Request;
use blobfront::server::{Acceptor, ResponderTls};
use blobfront::tls::{Role, SessionFactory};

/// Demo capability: answers every request with its own method name.
struct EchoStorage;

impl EchoStorage {
    fn echo(&self, request: &Request) -> Result<StorageResult, StorageError> {
        Ok(StorageResult::from_body(request.method().as_str()))
    }
}

#[async_trait]
impl StorageService for EchoStorage {
    async fn get(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        self.echo(request)
    }

    async fn post(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        self.echo(request)
    }

    async fn delete(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        self.echo(request)
    }

    async fn head(&self, request: &mut Request) -> Result<StorageResult, StorageError> {
        self.echo(request)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let dispatcher = Dispatcher::new(
        Arc::new(EchoStorage),
        Arc::new(NoopObserver),
        cfg.server.worker_count,
        cfg.server.queue_depth,
    );
    dispatcher.start()?;

    let tls = match &cfg.tls {
        Some(tls) if tls.role == Role::Responder => Some(ResponderTls {
            factory: Arc::new(SessionFactory::new()),
            trust: tls.trust.clone(),
        }),
        Some(_) => {
            anyhow::bail!("the listening front end requires the responder TLS role");
        }
        None => None,
    };

    let mut acceptor = Acceptor::new(&cfg.server.listen_addr, dispatcher.clone(), tls);
    acceptor.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    acceptor.shutdown().await;
    dispatcher.shutdown().await;

    Ok(())
}
