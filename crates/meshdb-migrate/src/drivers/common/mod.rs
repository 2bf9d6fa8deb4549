//! Utilities shared by the target drivers.

pub mod tls;

pub use tls::{SslMode, TlsBuilder};
