//! Service configuration.
//!
//! Loaded from a YAML file named by `BLOBFRONT_CONFIG`; without one, a
//! local default is used with the listen address taken from `LISTEN`.

use anyhow::Context;
use serde::Deserialize;

use crate::tls::{Role, TrustConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the acceptor binds, e.g. "127.0.0.1:8080"
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Number of dispatcher workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Bound on queued-but-not-started requests
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Handshake role; the listening front end uses `responder`
    pub role: Role,
    #[serde(flatten)]
    pub trust: TrustConfig,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_depth() -> usize {
    64
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("BLOBFRONT_CONFIG") {
            Ok(path) => Self::from_file(&path),
            Err(_) => Ok(Self::default_local()),
        }
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parsing config file {}", path))
    }

    fn default_local() -> Self {
        let listen_addr = std::env::var("LISTEN").unwrap_or_else(|_| default_listen_addr());
        Self {
            server: ServerConfig {
                listen_addr,
                worker_count: default_worker_count(),
                queue_depth: default_queue_depth(),
            },
            tls: None,
        }
    }
}
