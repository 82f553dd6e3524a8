//! Dynamic reverse proxy for the Slipway launcher.
//!
//! One handler fronted by two listeners: plain HTTP on the listen address
//! and TLS on the bind address when HTTPS is enabled. Hosts resolve to
//! managed service endpoints, static proxy entries or the embedded
//! management API; ACME challenge traffic short-circuits to the published
//! HTTP-01 challenge server.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod discovery;
pub mod handler;
pub mod prelude;
pub mod tls;

pub use handler::{router, ProxyConfig, ProxyState};

// vim: ts=4
