//! Database schema migrations.
//!
//! Named, ordered migrations with up/down SQL. `upgrade` applies the
//! missing ones, `downgrade` reverts the most recent one.

use sqlx::SqlitePool;

use crate::utils::inspect;
use slipway_types::prelude::*;

struct Migration {
	name: &'static str,
	up: &'static [&'static str],
	down: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
	Migration {
		name: "0001_core",
		up: &[
			"CREATE TABLE IF NOT EXISTS repositories (
				id text PRIMARY KEY,
				repo text NOT NULL,
				token text,
				release_file_pattern text NOT NULL,
				exec_file_pattern text NOT NULL,
				retention integer NOT NULL DEFAULT 3,
				disabled integer NOT NULL DEFAULT 0,
				created integer NOT NULL DEFAULT (unixepoch())
			)",
			"CREATE TABLE IF NOT EXISTS releases (
				id text PRIMARY KEY,
				repository_id text NOT NULL,
				version text NOT NULL,
				release_name text NOT NULL,
				published_at integer NOT NULL,
				asset_id text NOT NULL,
				asset_file_name text NOT NULL,
				download_url text NOT NULL,
				asset_size integer NOT NULL,
				UNIQUE(repository_id, version)
			)",
			"CREATE TABLE IF NOT EXISTS services (
				id text PRIMARY KEY,
				name text NOT NULL,
				release_id text NOT NULL,
				restart_policy text NOT NULL DEFAULT 'no',
				status text NOT NULL DEFAULT 'idle',
				ip text,
				port integer,
				error_message text,
				last_started integer,
				deleted integer,
				install_token text,
				boot_user_email text,
				boot_user_password text,
				created integer NOT NULL DEFAULT (unixepoch())
			)",
			"CREATE TABLE IF NOT EXISTS service_commands (
				id text PRIMARY KEY,
				service_id text NOT NULL,
				action text NOT NULL,
				status text NOT NULL DEFAULT 'pending',
				error_message text,
				executed integer,
				created integer NOT NULL DEFAULT (unixepoch())
			)",
			"CREATE INDEX IF NOT EXISTS idx_service_commands_pending
				ON service_commands(status, created)",
		],
		down: &[
			"DROP TABLE IF EXISTS service_commands",
			"DROP TABLE IF EXISTS services",
			"DROP TABLE IF EXISTS releases",
			"DROP TABLE IF EXISTS repositories",
		],
	},
	Migration {
		name: "0002_domains",
		up: &[
			"CREATE TABLE IF NOT EXISTS domains (
				id text PRIMARY KEY,
				domain text NOT NULL UNIQUE,
				service_id text,
				proxy_entry_id text,
				use_https integer NOT NULL DEFAULT 0,
				created integer NOT NULL DEFAULT (unixepoch())
			)",
			"CREATE TABLE IF NOT EXISTS proxy_entries (
				id text PRIMARY KEY,
				name text NOT NULL,
				target_url text NOT NULL,
				enabled integer NOT NULL DEFAULT 1,
				deleted integer,
				created integer NOT NULL DEFAULT (unixepoch())
			)",
		],
		down: &["DROP TABLE IF EXISTS proxy_entries", "DROP TABLE IF EXISTS domains"],
	},
	Migration {
		name: "0003_cert_requests",
		up: &[
			"CREATE TABLE IF NOT EXISTS cert_requests (
				id text PRIMARY KEY,
				domain text NOT NULL,
				status text NOT NULL DEFAULT 'pending',
				not_before integer,
				attempt integer NOT NULL DEFAULT 1,
				message text,
				requested integer,
				created integer NOT NULL DEFAULT (unixepoch())
			)",
			"CREATE INDEX IF NOT EXISTS idx_cert_requests_domain
				ON cert_requests(domain, created)",
		],
		down: &["DROP TABLE IF EXISTS cert_requests"],
	},
	Migration {
		name: "0004_superusers",
		up: &[
			"CREATE TABLE IF NOT EXISTS superusers (
				id text PRIMARY KEY,
				email text NOT NULL UNIQUE,
				password_hash text NOT NULL,
				created integer NOT NULL DEFAULT (unixepoch())
			)",
			"CREATE TABLE IF NOT EXISTS users (
				id text PRIMARY KEY,
				email text NOT NULL UNIQUE,
				password_hash text NOT NULL,
				verified integer NOT NULL DEFAULT 0,
				created integer NOT NULL DEFAULT (unixepoch())
			)",
		],
		down: &["DROP TABLE IF EXISTS users", "DROP TABLE IF EXISTS superusers"],
	},
];

async fn applied(db: &SqlitePool) -> SwResult<Vec<String>> {
	sqlx::query("CREATE TABLE IF NOT EXISTS migrations (
			name text PRIMARY KEY,
			applied integer NOT NULL DEFAULT (unixepoch())
		)")
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	let rows = sqlx::query_scalar::<_, String>("SELECT name FROM migrations ORDER BY name")
		.fetch_all(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	Ok(rows)
}

/// Applies every missing migration; returns the names applied.
pub(crate) async fn upgrade(db: &SqlitePool) -> SwResult<Vec<Box<str>>> {
	let done = applied(db).await?;
	let mut newly_applied = Vec::new();

	for migration in MIGRATIONS {
		if done.iter().any(|name| name == migration.name) {
			continue;
		}
		let mut tx = db.begin().await.inspect_err(inspect).map_err(|_| Error::DbError)?;
		for statement in migration.up {
			sqlx::query(statement)
				.execute(&mut *tx)
				.await
				.inspect_err(inspect)
				.map_err(|_| Error::DbError)?;
		}
		sqlx::query("INSERT INTO migrations (name) VALUES (?)")
			.bind(migration.name)
			.execute(&mut *tx)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;
		tx.commit().await.inspect_err(inspect).map_err(|_| Error::DbError)?;

		info!("migration applied: {}", migration.name);
		newly_applied.push(migration.name.into());
	}
	Ok(newly_applied)
}

/// Reverts the most recently applied migration, if any.
pub(crate) async fn downgrade(db: &SqlitePool) -> SwResult<Option<Box<str>>> {
	let done = applied(db).await?;
	let Some(last) = done.last() else {
		return Ok(None);
	};
	let Some(migration) = MIGRATIONS.iter().find(|m| m.name == last) else {
		return Err(Error::Internal(format!("unknown applied migration: {}", last)));
	};

	let mut tx = db.begin().await.inspect_err(inspect).map_err(|_| Error::DbError)?;
	for statement in migration.down {
		sqlx::query(statement)
			.execute(&mut *tx)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;
	}
	sqlx::query("DELETE FROM migrations WHERE name=?")
		.bind(migration.name)
		.execute(&mut *tx)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	tx.commit().await.inspect_err(inspect).map_err(|_| Error::DbError)?;

	info!("migration reverted: {}", migration.name);
	Ok(Some(migration.name.into()))
}

// vim: ts=4
