//! Certificate management for the Slipway launcher.
//!
//! The pieces fit together like this: the [`manager`] planner decides which
//! domains need a certificate and records a pending request; the executor
//! hands each request to the configured [`providers`] implementation, which
//! obtains the PEM pair (self-signed, mkcert, or ACME via HTTP-01/DNS-01);
//! the result lands in the [`store`], where the TLS listener and the planner
//! resolve it again. The HTTP-01 flow publishes its ephemeral challenge
//! server address through [`publisher`] so the reverse proxy can route
//! `/.well-known/acme-challenge/` traffic to it.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod http01;
pub mod manager;
pub mod prelude;
pub mod providers;
pub mod publisher;
pub mod store;

pub use providers::CertificateProvider;
pub use publisher::ChallengeAddressPublisher;
pub use store::{Certificate, CertificateStore};

// vim: ts=4
