//! Connection acceptance and lifecycle.

pub mod listener;

pub use listener::{Acceptor, ResponderTls};
