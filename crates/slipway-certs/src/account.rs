//! ACME account persistence. One account per email, registered once and
//! re-used: `<accounts_dir>/<email>/account.json` holds the serialized
//! credentials (the account key is embedded in them).

use instant_acme::{self as acme, Account, AccountCredentials};
use std::path::PathBuf;

use crate::prelude::*;

const ACCOUNT_JSON_FILE_NAME: &str = "account.json";

pub struct AccountProvider {
	base_dir: PathBuf,
	directory_url: String,
}

impl AccountProvider {
	pub fn new(base_dir: impl Into<PathBuf>) -> Self {
		Self {
			base_dir: base_dir.into(),
			directory_url: acme::LetsEncrypt::Production.url().to_owned(),
		}
	}

	/// Points the provider at a different ACME directory (staging, pebble).
	pub fn with_directory_url(mut self, url: impl Into<String>) -> Self {
		self.directory_url = url.into();
		self
	}

	fn account_json_path(&self, email: &str) -> PathBuf {
		self.base_dir.join(email).join(ACCOUNT_JSON_FILE_NAME)
	}

	/// Loads the stored account for `email`, or registers a new one with the
	/// CA (terms agreed) and persists its credentials.
	pub async fn account(&self, email: &str) -> SwResult<Account> {
		let path = self.account_json_path(email);

		match tokio::fs::read(&path).await {
			Ok(data) => {
				let credentials: AccountCredentials = serde_json::from_slice(&data)?;
				let account = Account::builder()
					.map_err(|e| Error::ChallengeFailed(format!("acme client: {}", e)))?
					.from_credentials(credentials)
					.await
					.map_err(|e| Error::ChallengeFailed(format!("acme account load: {}", e)))?;
				debug!("Loaded ACME account for {}", email);
				Ok(account)
			}
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				info!("Registering new ACME account for {}", email);
				let contact = format!("mailto:{}", email);
				let (account, credentials) = Account::builder()
					.map_err(|e| Error::ChallengeFailed(format!("acme client: {}", e)))?
					.create(
						&acme::NewAccount {
							contact: &[&contact],
							terms_of_service_agreed: true,
							only_return_existing: false,
						},
						self.directory_url.clone(),
						None,
					)
					.await
					.map_err(|e| Error::ChallengeFailed(format!("acme registration: {}", e)))?;

				if let Some(dir) = path.parent() {
					tokio::fs::create_dir_all(dir).await?;
				}
				// Write via a temp file so a crash never leaves half a key
				let json = serde_json::to_vec_pretty(&credentials)?;
				let tmp = path.with_extension("json.tmp");
				tokio::fs::write(&tmp, &json).await?;
				tokio::fs::rename(&tmp, &path).await?;

				Ok(account)
			}
			Err(err) => Err(err.into()),
		}
	}
}

// vim: ts=4
