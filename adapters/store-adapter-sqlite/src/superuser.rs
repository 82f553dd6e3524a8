//! Superuser and user rows for the admin API bootstrap.

use sqlx::SqlitePool;

use slipway_types::prelude::*;

use crate::utils::*;

pub(crate) async fn count(db: &SqlitePool) -> SwResult<i64> {
	sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM superusers")
		.fetch_one(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)
}

/// Creates the superuser and, unless it already exists, a matching user row
/// in one transaction.
pub(crate) async fn create_with_user(
	db: &SqlitePool,
	email: &str,
	password: &str,
) -> SwResult<()> {
	let hash = hash_password(password);
	let mut tx = db.begin().await.inspect_err(inspect).map_err(|_| Error::DbError)?;

	let res = sqlx::query("INSERT INTO superusers (id, email, password_hash) VALUES (?, ?, ?)")
		.bind(new_id())
		.bind(email)
		.bind(&hash)
		.execute(&mut *tx)
		.await;
	if let Err(sqlx::Error::Database(err)) = &res {
		if err.is_unique_violation() {
			return Err(Error::AlreadyExists(email.into()));
		}
	}
	res.inspect_err(inspect).map_err(|_| Error::DbError)?;

	let existing =
		sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email=?")
			.bind(email)
			.fetch_one(&mut *tx)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;
	if existing == 0 {
		sqlx::query(
			"INSERT INTO users (id, email, password_hash, verified) VALUES (?, ?, ?, 1)",
		)
		.bind(new_id())
		.bind(email)
		.bind(&hash)
		.execute(&mut *tx)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	}

	tx.commit().await.inspect_err(inspect).map_err(|_| Error::DbError)?;
	Ok(())
}

pub(crate) async fn check_password(
	db: &SqlitePool,
	email: &str,
	password: &str,
) -> SwResult<bool> {
	let hash = sqlx::query_scalar::<_, String>("SELECT password_hash FROM superusers WHERE email=?")
		.bind(email)
		.fetch_optional(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	Ok(hash.is_some_and(|hash| verify_password(password, &hash)))
}

// vim: ts=4
