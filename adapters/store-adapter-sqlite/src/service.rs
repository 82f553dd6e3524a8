//! Service rows. Status and endpoint transitions belong to the supervisor.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use slipway_types::prelude::*;
use slipway_types::store::{
	CreateService, RestartPolicy, Service, ServiceEndpoint, ServiceStatus, UpdateService,
};

use crate::utils::*;

fn map_row(row: &SqliteRow) -> Result<Service, sqlx::Error> {
	let status: String = row.try_get("status")?;
	let restart_policy: String = row.try_get("restart_policy")?;
	Ok(Service {
		id: row.try_get::<String, _>("id")?.into(),
		name: row.try_get::<String, _>("name")?.into(),
		release_id: row.try_get::<String, _>("release_id")?.into(),
		restart_policy: RestartPolicy::parse_lenient(&restart_policy),
		status: ServiceStatus::parse(&status).unwrap_or(ServiceStatus::Failure),
		ip: row.try_get::<Option<String>, _>("ip")?.map(Into::into),
		port: row.try_get::<Option<i64>, _>("port")?.map(|p| p as u16),
		error_message: row.try_get::<Option<String>, _>("error_message")?.map(Into::into),
		last_started: row.try_get::<Option<i64>, _>("last_started")?.map(Timestamp),
		deleted: row.try_get::<Option<i64>, _>("deleted")?.map(Timestamp),
		install_token: row.try_get::<Option<String>, _>("install_token")?.map(Into::into),
		boot_user_email: row.try_get::<Option<String>, _>("boot_user_email")?.map(Into::into),
		boot_user_password: row
			.try_get::<Option<String>, _>("boot_user_password")?
			.map(Into::into),
		created: Timestamp(row.try_get("created")?),
	})
}

pub(crate) async fn find(db: &SqlitePool, id: &str) -> SwResult<Service> {
	let row = sqlx::query("SELECT * FROM services WHERE id=?").bind(id).fetch_one(db).await;
	map_res(row, |row| map_row(&row))
}

pub(crate) async fn list(db: &SqlitePool) -> SwResult<Vec<Service>> {
	let rows = sqlx::query("SELECT * FROM services WHERE deleted IS NULL ORDER BY created")
		.fetch_all(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	collect_res(rows.iter().map(map_row))
}

pub(crate) async fn list_running(db: &SqlitePool) -> SwResult<Vec<Service>> {
	let rows = sqlx::query("SELECT * FROM services WHERE status='running' AND deleted IS NULL")
		.fetch_all(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	collect_res(rows.iter().map(map_row))
}

pub(crate) async fn find_running(db: &SqlitePool, id: &str) -> SwResult<ServiceEndpoint> {
	let row = sqlx::query(
		"SELECT id, ip, port FROM services
		WHERE id=? AND status='running' AND deleted IS NULL AND ip IS NOT NULL AND port IS NOT NULL",
	)
	.bind(id)
	.fetch_one(db)
	.await;
	map_res(row, |row| {
		Ok(ServiceEndpoint {
			id: row.try_get::<String, _>("id")?.into(),
			ip: row.try_get::<String, _>("ip")?.into(),
			port: row.try_get::<i64, _>("port")? as u16,
		})
	})
}

pub(crate) async fn create(db: &SqlitePool, data: CreateService<'_>) -> SwResult<Service> {
	let id = new_id();
	sqlx::query(
		"INSERT INTO services (id, name, release_id, restart_policy, status,
			boot_user_email, boot_user_password)
		VALUES (?, ?, ?, ?, 'idle', ?, ?)",
	)
	.bind(&id)
	.bind(data.name)
	.bind(data.release_id)
	.bind(data.restart_policy.as_str())
	.bind(data.boot_user_email)
	.bind(data.boot_user_password)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	find(db, &id).await
}

/// Only name, restart policy and the tombstone are caller-mutable.
pub(crate) async fn update(
	db: &SqlitePool,
	id: &str,
	data: UpdateService<'_>,
) -> SwResult<Service> {
	let mut query = sqlx::QueryBuilder::new("UPDATE services SET id=id");
	if let Some(name) = data.name {
		query.push(", name=").push_bind(name);
	}
	if let Some(restart_policy) = data.restart_policy {
		query.push(", restart_policy=").push_bind(restart_policy.as_str());
	}
	if let Some(deleted) = data.deleted {
		query.push(", deleted=").push_bind(deleted.0);
	}
	query.push(" WHERE id=").push_bind(id);
	query
		.build()
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	find(db, id).await
}

pub(crate) async fn mark_running(db: &SqlitePool, id: &str, ip: &str, port: u16) -> SwResult<()> {
	sqlx::query(
		"UPDATE services SET status='running', ip=?, port=?, last_started=unixepoch(),
			error_message=NULL WHERE id=?",
	)
	.bind(ip)
	.bind(i64::from(port))
	.bind(id)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	Ok(())
}

pub(crate) async fn mark_stopped(db: &SqlitePool, id: &str) -> SwResult<()> {
	sqlx::query("UPDATE services SET status='stopped' WHERE id=?")
		.bind(id)
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	Ok(())
}

pub(crate) async fn mark_failure(db: &SqlitePool, id: &str, message: &str) -> SwResult<()> {
	sqlx::query("UPDATE services SET status='failure', error_message=? WHERE id=?")
		.bind(message)
		.bind(id)
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	Ok(())
}

pub(crate) async fn set_install_token(db: &SqlitePool, id: &str, token: &str) -> SwResult<()> {
	sqlx::query("UPDATE services SET install_token=? WHERE id=?")
		.bind(token)
		.bind(id)
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	Ok(())
}

pub(crate) async fn clean_install_token(db: &SqlitePool, token: &str) -> SwResult<()> {
	sqlx::query("UPDATE services SET install_token=NULL WHERE install_token=?")
		.bind(token)
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	Ok(())
}

// vim: ts=4
