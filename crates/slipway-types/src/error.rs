//! Error handling subsystem. Implements a custom Error type.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use tracing::warn;

pub type SwResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	// Core errors
	NotFound,
	AlreadyExists(String),
	Unauthorized,
	DbError,
	Parse,

	// Input validation and constraints
	ValidationError(String),

	// Lifecycle errors
	AlreadyRunning(String),
	InvalidState(String),

	// Artifacts
	BinaryNotFound(String),

	// Certificates
	InvalidPem,
	CertificateExpired,
	CertificateNotFound(String),
	UnsupportedProvider(String),
	ChallengeFailed(String),

	// Network and external services
	Transient(String),
	Timeout,

	// Filesystem safety
	Traversal(String),

	// System and configuration
	ConfigError(String),
	Internal(String),

	// externals
	Io(std::io::Error),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		warn!("io error: {}", err);
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(_err: serde_json::Error) -> Self {
		warn!("json error: {}", _err);
		Error::Parse
	}
}

impl From<std::net::AddrParseError> for Error {
	fn from(err: std::net::AddrParseError) -> Self {
		Error::ValidationError(format!("invalid address: {}", err))
	}
}

impl From<std::num::ParseIntError> for Error {
	fn from(_err: std::num::ParseIntError) -> Self {
		warn!("parse int error: {}", _err);
		Error::Parse
	}
}

impl From<axum::http::Error> for Error {
	fn from(_err: axum::http::Error) -> Self {
		warn!("http error: {}", _err);
		Error::Transient("http error".into())
	}
}

impl From<axum::http::header::ToStrError> for Error {
	fn from(_err: axum::http::header::ToStrError) -> Self {
		Error::Parse
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(_err: tokio::task::JoinError) -> Self {
		warn!("tokio join error: {}", _err);
		Error::Internal("task execution failed".into())
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::AlreadyExists(what) => write!(f, "already exists: {}", what),
			Error::Unauthorized => write!(f, "unauthorized"),
			Error::DbError => write!(f, "database error"),
			Error::Parse => write!(f, "parse error"),
			Error::ValidationError(msg) => write!(f, "validation failed: {}", msg),
			Error::AlreadyRunning(id) => write!(f, "already running: {}", id),
			Error::InvalidState(msg) => write!(f, "invalid state: {}", msg),
			Error::BinaryNotFound(msg) => write!(f, "binary not found: {}", msg),
			Error::InvalidPem => write!(f, "invalid certificate PEM format"),
			Error::CertificateExpired => write!(f, "certificate is expired or not yet valid"),
			Error::CertificateNotFound(domain) => write!(f, "certificate not found: {}", domain),
			Error::UnsupportedProvider(name) => write!(f, "unsupported certificate provider: {}", name),
			Error::ChallengeFailed(msg) => write!(f, "challenge failed: {}", msg),
			Error::Transient(msg) => write!(f, "transient error: {}", msg),
			Error::Timeout => write!(f, "timeout"),
			Error::Traversal(path) => write!(f, "illegal file path: {}", path),
			Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
			Error::Io(err) => write!(f, "io error: {}", err),
		}
	}
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub code: Box<str>,
	pub message: String,
}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let (status, code, message) = match self {
			Error::NotFound => (StatusCode::NOT_FOUND, "E-CORE-NOTFOUND", "Resource not found".to_string()),
			Error::AlreadyExists(what) => {
				(StatusCode::CONFLICT, "E-CORE-CONFLICT", format!("Resource conflict: {}", what))
			}
			Error::Unauthorized => (
				StatusCode::UNAUTHORIZED,
				"E-AUTH-UNAUTH",
				"Authentication required or invalid token".to_string(),
			),
			Error::ValidationError(msg) => (
				StatusCode::BAD_REQUEST,
				"E-VAL-INVALID",
				format!("Request validation failed: {}", msg),
			),
			Error::AlreadyRunning(id) => (
				StatusCode::CONFLICT,
				"E-RUN-RUNNING",
				format!("Service is already running: {}", id),
			),
			Error::InvalidState(msg) => {
				(StatusCode::CONFLICT, "E-RUN-STATE", format!("Invalid state: {}", msg))
			}
			Error::Timeout => {
				(StatusCode::GATEWAY_TIMEOUT, "E-NET-TIMEOUT", "Request timeout".to_string())
			}
			Error::Transient(_) => {
				(StatusCode::BAD_GATEWAY, "E-NET-UPSTREAM", "Upstream error".to_string())
			}
			// Server errors (5xx) - no message exposure
			Error::DbError => {
				(StatusCode::INTERNAL_SERVER_ERROR, "E-CORE-DBERR", "Internal server error".to_string())
			}
			Error::Internal(msg) => {
				warn!("internal error: {}", msg);
				(StatusCode::INTERNAL_SERVER_ERROR, "E-CORE-INTERNAL", "Internal server error".to_string())
			}
			Error::Parse => {
				(StatusCode::INTERNAL_SERVER_ERROR, "E-CORE-PARSE", "Internal server error".to_string())
			}
			Error::Io(_) => {
				(StatusCode::INTERNAL_SERVER_ERROR, "E-SYS-IO", "Internal server error".to_string())
			}
			Error::BinaryNotFound(_) => {
				(StatusCode::INTERNAL_SERVER_ERROR, "E-ART-NOBIN", "Internal server error".to_string())
			}
			Error::InvalidPem
			| Error::CertificateExpired
			| Error::CertificateNotFound(_)
			| Error::UnsupportedProvider(_)
			| Error::ChallengeFailed(_) => {
				(StatusCode::INTERNAL_SERVER_ERROR, "E-CERT-FAIL", "Internal server error".to_string())
			}
			Error::Traversal(_) => {
				(StatusCode::INTERNAL_SERVER_ERROR, "E-SYS-PATH", "Internal server error".to_string())
			}
			Error::ConfigError(_) => {
				(StatusCode::INTERNAL_SERVER_ERROR, "E-CONF-CFGERR", "Internal server error".to_string())
			}
		};

		let error_response = ErrorResponse { code: code.into(), message };
		(status, Json(error_response)).into_response()
	}
}

// vim: ts=4
