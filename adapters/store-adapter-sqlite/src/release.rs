//! Release rows. Inserted by the release sync, never mutated.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use slipway_types::prelude::*;
use slipway_types::store::{InsertRelease, Release};

use crate::utils::*;

fn map_row(row: &SqliteRow) -> Result<Release, sqlx::Error> {
	Ok(Release {
		id: row.try_get::<String, _>("id")?.into(),
		repository_id: row.try_get::<String, _>("repository_id")?.into(),
		version: row.try_get::<String, _>("version")?.into(),
		release_name: row.try_get::<String, _>("release_name")?.into(),
		published_at: Timestamp(row.try_get("published_at")?),
		asset_id: row.try_get::<String, _>("asset_id")?.into(),
		asset_file_name: row.try_get::<String, _>("asset_file_name")?.into(),
		download_url: row.try_get::<String, _>("download_url")?.into(),
		asset_size: row.try_get("asset_size")?,
	})
}

pub(crate) async fn list(db: &SqlitePool, repository_id: &str) -> SwResult<Vec<Release>> {
	let rows = sqlx::query(
		"SELECT * FROM releases WHERE repository_id=? ORDER BY published_at DESC",
	)
	.bind(repository_id)
	.fetch_all(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	collect_res(rows.iter().map(map_row))
}

pub(crate) async fn find(db: &SqlitePool, id: &str) -> SwResult<Release> {
	let row = sqlx::query("SELECT * FROM releases WHERE id=?").bind(id).fetch_one(db).await;
	map_res(row, |row| map_row(&row))
}

pub(crate) async fn insert(db: &SqlitePool, data: InsertRelease<'_>) -> SwResult<Release> {
	let id = new_id();
	let res = sqlx::query(
		"INSERT INTO releases (id, repository_id, version, release_name, published_at,
			asset_id, asset_file_name, download_url, asset_size)
		VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
	)
	.bind(&id)
	.bind(data.repository_id)
	.bind(data.version)
	.bind(data.release_name)
	.bind(data.published_at.0)
	.bind(data.asset_id)
	.bind(data.asset_file_name)
	.bind(data.download_url)
	.bind(data.asset_size)
	.execute(db)
	.await;

	match res {
		Ok(_) => find(db, &id).await,
		Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
			Err(Error::AlreadyExists(format!("{} {}", data.repository_id, data.version)))
		}
		Err(err) => {
			inspect(&err);
			Err(Error::DbError)
		}
	}
}

// vim: ts=4
