//! Certificate request rows.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use slipway_types::prelude::*;
use slipway_types::store::{CertRequest, CertRequestStatus};

use crate::utils::*;

fn map_row(row: &SqliteRow) -> Result<CertRequest, sqlx::Error> {
	let status: String = row.try_get("status")?;
	Ok(CertRequest {
		id: row.try_get::<String, _>("id")?.into(),
		domain: row.try_get::<String, _>("domain")?.into(),
		status: CertRequestStatus::parse(&status).unwrap_or(CertRequestStatus::Failed),
		not_before: row.try_get::<Option<i64>, _>("not_before")?.map(Timestamp),
		attempt: row.try_get::<i64, _>("attempt")?.max(1) as u32,
		message: row.try_get::<Option<String>, _>("message")?.map(Into::into),
		requested: row.try_get::<Option<i64>, _>("requested")?.map(Timestamp),
		created: Timestamp(row.try_get("created")?),
	})
}

pub(crate) async fn list(db: &SqlitePool) -> SwResult<Vec<CertRequest>> {
	let rows = sqlx::query("SELECT * FROM cert_requests ORDER BY rowid")
		.fetch_all(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	collect_res(rows.iter().map(map_row))
}

/// Pending requests in insertion order.
pub(crate) async fn pending(db: &SqlitePool) -> SwResult<Vec<CertRequest>> {
	let rows = sqlx::query("SELECT * FROM cert_requests WHERE status='pending' ORDER BY rowid")
		.fetch_all(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	collect_res(rows.iter().map(map_row))
}

pub(crate) async fn pending_by_domain(db: &SqlitePool, domain: &str) -> SwResult<Vec<CertRequest>> {
	let rows = sqlx::query(
		"SELECT * FROM cert_requests WHERE status='pending' AND domain=? ORDER BY rowid",
	)
	.bind(domain)
	.fetch_all(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	collect_res(rows.iter().map(map_row))
}

pub(crate) async fn last_by_domain(
	db: &SqlitePool,
	domain: &str,
) -> SwResult<Option<CertRequest>> {
	let row = sqlx::query(
		"SELECT * FROM cert_requests WHERE domain=? ORDER BY created DESC, rowid DESC LIMIT 1",
	)
	.bind(domain)
	.fetch_optional(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	match row {
		Some(row) => Ok(Some(map_row(&row).inspect_err(inspect).map_err(|_| Error::DbError)?)),
		None => Ok(None),
	}
}

pub(crate) async fn find(db: &SqlitePool, id: &str) -> SwResult<CertRequest> {
	let row = sqlx::query("SELECT * FROM cert_requests WHERE id=?").bind(id).fetch_one(db).await;
	map_res(row, |row| map_row(&row))
}

pub(crate) async fn create_pending(
	db: &SqlitePool,
	domain: &str,
	attempt: u32,
) -> SwResult<CertRequest> {
	let id = new_id();
	sqlx::query(
		"INSERT INTO cert_requests (id, domain, status, attempt) VALUES (?, ?, 'pending', ?)",
	)
	.bind(&id)
	.bind(domain)
	.bind(i64::from(attempt))
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	find(db, &id).await
}

pub(crate) async fn mark_approved(db: &SqlitePool, id: &str) -> SwResult<()> {
	sqlx::query(
		"UPDATE cert_requests SET status='approved', requested=unixepoch()
		WHERE id=? AND status='pending'",
	)
	.bind(id)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	Ok(())
}

pub(crate) async fn mark_failed(db: &SqlitePool, id: &str, message: &str) -> SwResult<()> {
	sqlx::query(
		"UPDATE cert_requests SET status='failed', message=? WHERE id=? AND status='pending'",
	)
	.bind(message)
	.bind(id)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	Ok(())
}

pub(crate) async fn delete(db: &SqlitePool, id: &str) -> SwResult<()> {
	sqlx::query("DELETE FROM cert_requests WHERE id=?")
		.bind(id)
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	Ok(())
}

pub(crate) async fn delete_pending(db: &SqlitePool, domain: &str) -> SwResult<()> {
	sqlx::query("DELETE FROM cert_requests WHERE domain=? AND status='pending'")
		.bind(domain)
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	Ok(())
}

// vim: ts=4
