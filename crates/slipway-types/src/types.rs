//! Common value types shared across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unix timestamp (seconds) newtype used in all row types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Self {
		Timestamp(Utc::now().timestamp())
	}

	pub fn from_now(seconds: i64) -> Self {
		Timestamp(Utc::now().timestamp() + seconds)
	}

	/// Format as `YYYY-MM-DD_HH-MM-SS`, the certificate folder name format.
	pub fn folder_name(&self) -> String {
		DateTime::<Utc>::from_timestamp(self.0, 0)
			.unwrap_or_else(Utc::now)
			.format("%Y-%m-%d_%H-%M-%S")
			.to_string()
	}

	pub fn to_iso(&self) -> String {
		DateTime::<Utc>::from_timestamp(self.0, 0)
			.unwrap_or_else(Utc::now)
			.to_rfc3339()
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}


// vim: ts=4
