//! Process supervision for the Slipway launcher.
//!
//! [`process`] wraps one child OS process with start/stop/monitor
//! semantics; [`logstore`] keeps a bounded per-service history of its
//! output; [`supervisor`] evaluates the service command queue, handles
//! crashes and recovers state after a launcher restart; [`token`] captures
//! the one-time install token the upstream application prints on first
//! boot.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod logstore;
pub mod prelude;
pub mod process;
pub mod supervisor;
pub mod token;

pub use supervisor::ServiceSupervisor;

// vim: ts=4
