//! Proxy entry rows: static upstream targets.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use slipway_types::prelude::*;
use slipway_types::store::{CreateProxyEntry, ProxyEntry};

use crate::utils::*;

fn map_row(row: &SqliteRow) -> Result<ProxyEntry, sqlx::Error> {
	Ok(ProxyEntry {
		id: row.try_get::<String, _>("id")?.into(),
		name: row.try_get::<String, _>("name")?.into(),
		target_url: row.try_get::<String, _>("target_url")?.into(),
		enabled: row.try_get::<i64, _>("enabled")? != 0,
		deleted: row.try_get::<Option<i64>, _>("deleted")?.map(Timestamp),
		created: Timestamp(row.try_get("created")?),
	})
}

pub(crate) async fn find_enabled(db: &SqlitePool, id: &str) -> SwResult<ProxyEntry> {
	let row = sqlx::query(
		"SELECT * FROM proxy_entries WHERE id=? AND enabled=1 AND deleted IS NULL",
	)
	.bind(id)
	.fetch_one(db)
	.await;
	map_res(row, |row| map_row(&row))
}

pub(crate) async fn find(db: &SqlitePool, id: &str) -> SwResult<ProxyEntry> {
	let row = sqlx::query("SELECT * FROM proxy_entries WHERE id=?").bind(id).fetch_one(db).await;
	map_res(row, |row| map_row(&row))
}

pub(crate) async fn list(db: &SqlitePool) -> SwResult<Vec<ProxyEntry>> {
	let rows = sqlx::query("SELECT * FROM proxy_entries WHERE deleted IS NULL ORDER BY created")
		.fetch_all(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	collect_res(rows.iter().map(map_row))
}

pub(crate) async fn create(db: &SqlitePool, data: CreateProxyEntry<'_>) -> SwResult<ProxyEntry> {
	let id = new_id();
	sqlx::query("INSERT INTO proxy_entries (id, name, target_url, enabled) VALUES (?, ?, ?, ?)")
		.bind(&id)
		.bind(data.name)
		.bind(data.target_url)
		.bind(i64::from(data.enabled))
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	find(db, &id).await
}

// vim: ts=4
