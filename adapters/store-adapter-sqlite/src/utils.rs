//! Shared helpers for the SQLite adapter modules.

use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;

use slipway_types::prelude::*;

pub(crate) fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

pub(crate) fn map_res<T, F>(row: Result<SqliteRow, sqlx::Error>, f: F) -> SwResult<T>
where
	F: FnOnce(SqliteRow) -> Result<T, sqlx::Error>,
{
	match row {
		Ok(row) => f(row).inspect_err(inspect).map_err(|_| Error::DbError),
		Err(sqlx::Error::RowNotFound) => Err(Error::NotFound),
		Err(err) => {
			inspect(&err);
			Err(Error::DbError)
		}
	}
}

pub(crate) fn collect_res<T>(
	iter: impl Iterator<Item = Result<T, sqlx::Error>>,
) -> SwResult<Vec<T>> {
	let mut items = Vec::new();
	for item in iter {
		items.push(item.inspect_err(inspect).map_err(|_| Error::DbError)?);
	}
	Ok(items)
}

/// 15-character lowercase alphanumeric record id.
pub(crate) fn new_id() -> String {
	rand::rng()
		.sample_iter(&Alphanumeric)
		.take(15)
		.map(char::from)
		.collect::<String>()
		.to_lowercase()
}

/// Salted SHA-256 password hash, stored as `salt$hex`.
pub(crate) fn hash_password(password: &str) -> String {
	let salt: String = rand::rng().sample_iter(&Alphanumeric).take(16).map(char::from).collect();
	format!("{}${}", salt, digest(&salt, password))
}

pub(crate) fn verify_password(password: &str, stored: &str) -> bool {
	let Some((salt, hash)) = stored.split_once('$') else {
		return false;
	};
	digest(salt, password) == hash
}

fn digest(salt: &str, password: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(salt.as_bytes());
	hasher.update(password.as_bytes());
	hasher
		.finalize()
		.iter()
		.map(|b| format!("{:02x}", b))
		.collect()
}


// vim: ts=4
