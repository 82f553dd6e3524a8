//! Domain binding rows: hostname → managed service or proxy entry.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use slipway_types::prelude::*;
use slipway_types::store::{CreateDomainBinding, DomainBinding};

use crate::utils::*;

fn map_row(row: &SqliteRow) -> Result<DomainBinding, sqlx::Error> {
	Ok(DomainBinding {
		id: row.try_get::<String, _>("id")?.into(),
		domain: row.try_get::<String, _>("domain")?.into(),
		service_id: row.try_get::<Option<String>, _>("service_id")?.map(Into::into),
		proxy_entry_id: row.try_get::<Option<String>, _>("proxy_entry_id")?.map(Into::into),
		use_https: row.try_get::<i64, _>("use_https")? != 0,
		created: Timestamp(row.try_get("created")?),
	})
}

pub(crate) async fn list_https_domains(db: &SqlitePool) -> SwResult<Vec<Box<str>>> {
	let rows = sqlx::query_scalar::<_, String>(
		"SELECT domain FROM domains WHERE use_https=1 ORDER BY domain",
	)
	.fetch_all(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn list(db: &SqlitePool) -> SwResult<Vec<DomainBinding>> {
	let rows = sqlx::query("SELECT * FROM domains ORDER BY domain")
		.fetch_all(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	collect_res(rows.iter().map(map_row))
}

pub(crate) async fn find_by_domain(db: &SqlitePool, domain: &str) -> SwResult<DomainBinding> {
	let row = sqlx::query("SELECT * FROM domains WHERE domain=?")
		.bind(domain)
		.fetch_one(db)
		.await;
	map_res(row, |row| map_row(&row))
}

pub(crate) async fn find(db: &SqlitePool, id: &str) -> SwResult<DomainBinding> {
	let row = sqlx::query("SELECT * FROM domains WHERE id=?").bind(id).fetch_one(db).await;
	map_res(row, |row| map_row(&row))
}

pub(crate) async fn create(
	db: &SqlitePool,
	data: CreateDomainBinding<'_>,
) -> SwResult<DomainBinding> {
	// Exactly one target
	if data.service_id.is_some() == data.proxy_entry_id.is_some() {
		return Err(Error::ValidationError(
			"exactly one of service_id and proxy_entry_id must be set".into(),
		));
	}

	let id = new_id();
	let res = sqlx::query(
		"INSERT INTO domains (id, domain, service_id, proxy_entry_id, use_https)
		VALUES (?, ?, ?, ?, ?)",
	)
	.bind(&id)
	.bind(data.domain)
	.bind(data.service_id)
	.bind(data.proxy_entry_id)
	.bind(i64::from(data.use_https))
	.execute(db)
	.await;

	match res {
		Ok(_) => find(db, &id).await,
		Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
			Err(Error::AlreadyExists(data.domain.into()))
		}
		Err(err) => {
			inspect(&err);
			Err(Error::DbError)
		}
	}
}

pub(crate) async fn delete(db: &SqlitePool, id: &str) -> SwResult<()> {
	sqlx::query("DELETE FROM domains WHERE id=?")
		.bind(id)
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	Ok(())
}

// vim: ts=4
