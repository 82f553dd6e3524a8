//! Service command rows: the imperative lifecycle queue.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use slipway_types::prelude::*;
use slipway_types::store::{CommandAction, CommandStatus, ServiceCommand};

use crate::utils::*;

fn map_row(row: &SqliteRow) -> Result<ServiceCommand, sqlx::Error> {
	let action: String = row.try_get("action")?;
	let status: String = row.try_get("status")?;
	Ok(ServiceCommand {
		id: row.try_get::<String, _>("id")?.into(),
		service_id: row.try_get::<String, _>("service_id")?.into(),
		action: CommandAction::parse(&action).unwrap_or(CommandAction::Stop),
		status: CommandStatus::parse(&status).unwrap_or(CommandStatus::Error),
		error_message: row.try_get::<Option<String>, _>("error_message")?.map(Into::into),
		executed: row.try_get::<Option<i64>, _>("executed")?.map(Timestamp),
		created: Timestamp(row.try_get("created")?),
	})
}

pub(crate) async fn find(db: &SqlitePool, id: &str) -> SwResult<ServiceCommand> {
	let row =
		sqlx::query("SELECT * FROM service_commands WHERE id=?").bind(id).fetch_one(db).await;
	map_res(row, |row| map_row(&row))
}

/// Pending commands in `created` order; the rowid breaks same-second ties.
pub(crate) async fn pending(db: &SqlitePool) -> SwResult<Vec<ServiceCommand>> {
	let rows = sqlx::query(
		"SELECT * FROM service_commands WHERE status='pending' ORDER BY created, rowid",
	)
	.fetch_all(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	collect_res(rows.iter().map(map_row))
}

pub(crate) async fn enqueue(
	db: &SqlitePool,
	service_id: &str,
	action: CommandAction,
) -> SwResult<ServiceCommand> {
	let id = new_id();
	sqlx::query(
		"INSERT INTO service_commands (id, service_id, action, status) VALUES (?, ?, ?, 'pending')",
	)
	.bind(&id)
	.bind(service_id)
	.bind(action.as_str())
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	find(db, &id).await
}

pub(crate) async fn mark_success(db: &SqlitePool, id: &str) -> SwResult<()> {
	sqlx::query(
		"UPDATE service_commands SET status='success', error_message=NULL, executed=unixepoch()
		WHERE id=? AND status='pending'",
	)
	.bind(id)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	Ok(())
}

pub(crate) async fn mark_error(db: &SqlitePool, id: &str, message: &str) -> SwResult<()> {
	sqlx::query(
		"UPDATE service_commands SET status='error', error_message=?, executed=unixepoch()
		WHERE id=? AND status='pending'",
	)
	.bind(message)
	.bind(id)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	Ok(())
}

// vim: ts=4
