//! Repository rows.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use slipway_types::prelude::*;
use slipway_types::store::{CreateRepository, Repository};

use crate::utils::*;

fn map_row(row: &SqliteRow) -> Result<Repository, sqlx::Error> {
	Ok(Repository {
		id: row.try_get::<String, _>("id")?.into(),
		repo: row.try_get::<String, _>("repo")?.into(),
		token: row.try_get::<Option<String>, _>("token")?.map(Into::into),
		release_file_pattern: row.try_get::<String, _>("release_file_pattern")?.into(),
		exec_file_pattern: row.try_get::<String, _>("exec_file_pattern")?.into(),
		retention: row.try_get::<i64, _>("retention")?.clamp(1, 6) as u8,
		disabled: row.try_get::<i64, _>("disabled")? != 0,
		created: Timestamp(row.try_get("created")?),
	})
}

pub(crate) async fn list_active(db: &SqlitePool) -> SwResult<Vec<Repository>> {
	let rows = sqlx::query("SELECT * FROM repositories WHERE disabled=0 ORDER BY created")
		.fetch_all(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	collect_res(rows.iter().map(map_row))
}

pub(crate) async fn find(db: &SqlitePool, id: &str) -> SwResult<Repository> {
	let row = sqlx::query("SELECT * FROM repositories WHERE id=?")
		.bind(id)
		.fetch_one(db)
		.await;
	map_res(row, |row| map_row(&row))
}

pub(crate) async fn create(db: &SqlitePool, data: CreateRepository<'_>) -> SwResult<Repository> {
	let id = new_id();
	sqlx::query(
		"INSERT INTO repositories (id, repo, token, release_file_pattern, exec_file_pattern, retention)
		VALUES (?, ?, ?, ?, ?, ?)",
	)
	.bind(&id)
	.bind(data.repo)
	.bind(data.token)
	.bind(data.release_file_pattern)
	.bind(data.exec_file_pattern)
	.bind(i64::from(data.retention.clamp(1, 6)))
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	find(db, &id).await
}

// vim: ts=4
