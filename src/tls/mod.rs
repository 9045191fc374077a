//! TLS session establishment.
//!
//! The [`SessionFactory`] turns a role (initiator or responder) and a trust
//! configuration into a cached rustls context, and hands out one
//! [`Session`] per connection to drive the handshake. The trust
//! configuration enumerates permitted peer-identity groups; each group's CA
//! goes into the shared root store, so certificates issued under any
//! enumerated group validate and everything else is refused.

pub mod factory;

pub use factory::{Role, Session, SessionFactory, TlsContext, TrustConfig, TrustedGroup};
