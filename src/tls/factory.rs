use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};
use tracing::debug;

/// Which side of the handshake a session plays.
///
/// An initiator presents a certificate and validates the peer as responder;
/// a responder does the inverse. Both validate against the same trust
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Initiator,
    Responder,
}

/// One permitted peer-identity group, e.g. a datacenter, contributing its
/// issuing CA to the trust store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct TrustedGroup {
    /// Group name, for logs and diagnostics
    pub name: String,
    /// PEM file with the group's CA certificate(s)
    pub ca_certificate: PathBuf,
}

/// Trust configuration shared by both roles.
///
/// A peer certificate issued under any enumerated group validates; one
/// issued outside all groups fails in either role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct TrustConfig {
    /// PEM file with this service's certificate chain
    pub certificate: PathBuf,
    /// PEM file with this service's private key
    pub private_key: PathBuf,
    /// Permitted peer-identity groups
    pub trusted_groups: Vec<TrustedGroup>,
}

/// A reusable, role-specific rustls configuration.
pub enum TlsContext {
    Initiator(Arc<ClientConfig>),
    Responder(Arc<ServerConfig>),
}

/// A per-connection handshake driver bound to a cached context.
///
/// Never shared across connections; `handshake` consumes it.
pub enum Session {
    Initiator {
        connector: TlsConnector,
        server_name: ServerName<'static>,
    },
    Responder {
        acceptor: TlsAcceptor,
    },
}

impl Session {
    /// Runs the handshake and yields the encrypted byte channel.
    pub async fn handshake<S>(self, stream: S) -> anyhow::Result<TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self {
            Session::Initiator {
                connector,
                server_name,
            } => {
                let stream = connector
                    .connect(server_name, stream)
                    .await
                    .context("initiator handshake failed")?;
                Ok(stream.into())
            }
            Session::Responder { acceptor } => {
                let stream = acceptor
                    .accept(stream)
                    .await
                    .context("responder handshake failed")?;
                Ok(stream.into())
            }
        }
    }
}

/// Builds and caches TLS contexts, keyed by `(role, trust configuration)`.
///
/// Context construction reads certificates off disk and is idempotent per
/// key; sessions are cheap handles onto the cached context.
#[derive(Default)]
pub struct SessionFactory {
    contexts: Mutex<HashMap<(Role, TrustConfig), Arc<TlsContext>>>,
}

impl SessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached context for this role and trust configuration,
    /// building it on first use.
    pub fn context(&self, role: Role, config: &TrustConfig) -> anyhow::Result<Arc<TlsContext>> {
        let key = (role, config.clone());
        {
            let contexts = self.contexts.lock().unwrap();
            if let Some(ctx) = contexts.get(&key) {
                return Ok(Arc::clone(ctx));
            }
        }

        debug!(?role, "Building TLS context");
        let built = Arc::new(build_context(role, config)?);

        let mut contexts = self.contexts.lock().unwrap();
        // A racing builder may have won; keep whichever landed first.
        Ok(Arc::clone(contexts.entry(key).or_insert(built)))
    }

    /// Creates a per-connection session bound to the cached context.
    ///
    /// `peer_host` is the name an initiator validates the responder's
    /// certificate against; responders ignore it.
    pub fn session(
        &self,
        role: Role,
        config: &TrustConfig,
        peer_host: &str,
    ) -> anyhow::Result<Session> {
        match &*self.context(role, config)? {
            TlsContext::Initiator(client_config) => {
                let server_name = ServerName::try_from(peer_host.to_string())
                    .with_context(|| format!("invalid peer host name: {}", peer_host))?;
                Ok(Session::Initiator {
                    connector: TlsConnector::from(Arc::clone(client_config)),
                    server_name,
                })
            }
            TlsContext::Responder(server_config) => Ok(Session::Responder {
                acceptor: TlsAcceptor::from(Arc::clone(server_config)),
            }),
        }
    }
}

fn build_context(role: Role, config: &TrustConfig) -> anyhow::Result<TlsContext> {
    let roots = build_root_store(config)?;
    let certs = load_certs(&config.certificate)?;
    let key = load_private_key(&config.private_key)?;

    match role {
        Role::Responder => {
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .context("building peer certificate verifier")?;
            let server_config = ServerConfig::builder()
                .with_client_cert_verifier(verifier)
                .with_single_cert(certs, key)
                .context("building responder TLS context")?;
            Ok(TlsContext::Responder(Arc::new(server_config)))
        }
        Role::Initiator => {
            let client_config = ClientConfig::builder()
                .with_root_certificates(roots)
                .with_client_auth_cert(certs, key)
                .context("building initiator TLS context")?;
            Ok(TlsContext::Initiator(Arc::new(client_config)))
        }
    }
}

fn build_root_store(config: &TrustConfig) -> anyhow::Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for group in &config.trusted_groups {
        for cert in load_certs(&group.ca_certificate)? {
            roots
                .add(cert)
                .with_context(|| format!("adding CA certificate for group {}", group.name))?;
        }
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let file =
        File::open(path).with_context(|| format!("opening certificate file {:?}", path))?;
    let mut reader = BufReader::new(file);
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<_, _>>()
        .with_context(|| format!("reading certificates from {:?}", path))?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in {:?}", path);
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> anyhow::Result<PrivateKeyDer<'static>> {
    let file =
        File::open(path).with_context(|| format!("opening private key file {:?}", path))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("reading private key from {:?}", path))?
        .with_context(|| format!("no private key found in {:?}", path))
}
