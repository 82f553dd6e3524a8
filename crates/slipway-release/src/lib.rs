//! Release downloader for the Slipway launcher.
//!
//! The sync use-case fetches upstream release metadata per repository,
//! records new versions in the store, downloads the matching asset, and
//! extracts it into the versioned artifact tree on disk. The binary finder
//! locates the executable inside an extracted artifact.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod artifact;
pub mod finder;
pub mod github;
pub mod prelude;
pub mod sync;
pub mod unzip;

pub use sync::ReleaseSync;

// vim: ts=4
