//! Management API handlers, mounted under `/x-api`.

pub mod cert_requests;
pub mod domains;
pub mod proxy_entries;
pub mod repositories;
pub mod services;
pub mod setup;

// vim: ts=4
