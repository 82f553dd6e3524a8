//! Bounded per-service log history backed by an in-memory SQLite store.
//! The newest 500 entries per service are preserved.

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::sync::Arc;

use crate::prelude::*;
use crate::process::OutputSink;

pub const MAX_LOGS_PER_SERVICE: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
	Stdout,
	Stderr,
}

impl StreamType {
	pub fn as_str(&self) -> &'static str {
		match self {
			StreamType::Stdout => "stdout",
			StreamType::Stderr => "stderr",
		}
	}
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceLog {
	pub id: i64,
	pub service_id: Box<str>,
	pub stream: Box<str>,
	pub message: Box<str>,
	pub timestamp: Timestamp,
}

#[derive(Debug)]
pub struct ServiceLogStore {
	db: SqlitePool,
}

fn inspect(err: &sqlx::Error) {
	warn!("log store: {:#?}", err);
}

impl ServiceLogStore {
	pub async fn new() -> SwResult<Arc<Self>> {
		// One connection keeps the in-memory database alive for the pool's
		// lifetime
		let db = SqlitePoolOptions::new()
			.max_connections(1)
			.connect("sqlite::memory:")
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;

		sqlx::query(
			"CREATE TABLE IF NOT EXISTS service_logs (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				service_id TEXT NOT NULL,
				stream TEXT CHECK(stream IN ('stdout', 'stderr')) NOT NULL,
				message TEXT NOT NULL,
				timestamp INTEGER NOT NULL
			)",
		)
		.execute(&db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

		Ok(Arc::new(Self { db }))
	}

	pub async fn insert_log(
		&self,
		service_id: &str,
		stream: StreamType,
		message: &str,
	) -> SwResult<()> {
		sqlx::query("INSERT INTO service_logs (service_id, stream, message, timestamp) VALUES (?, ?, ?, ?)")
			.bind(service_id)
			.bind(stream.as_str())
			.bind(message)
			.bind(Timestamp::now().0)
			.execute(&self.db)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;

		// Trim anything older than the newest N for this service
		sqlx::query(
			"DELETE FROM service_logs WHERE service_id=? AND id NOT IN (
				SELECT id FROM service_logs WHERE service_id=? ORDER BY id DESC LIMIT ?
			)",
		)
		.bind(service_id)
		.bind(service_id)
		.bind(MAX_LOGS_PER_SERVICE)
		.execute(&self.db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

		Ok(())
	}

	/// The most recent `limit` entries, oldest first.
	pub async fn logs_by_service(&self, service_id: &str, limit: i64) -> SwResult<Vec<ServiceLog>> {
		let rows = sqlx::query(
			"SELECT id, service_id, stream, message, timestamp FROM (
				SELECT * FROM service_logs WHERE service_id=? ORDER BY id DESC LIMIT ?
			) ORDER BY id ASC",
		)
		.bind(service_id)
		.bind(limit.clamp(1, MAX_LOGS_PER_SERVICE))
		.fetch_all(&self.db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

		let mut logs = Vec::with_capacity(rows.len());
		for row in rows {
			logs.push(ServiceLog {
				id: row.try_get("id").map_err(|_| Error::DbError)?,
				service_id: row.try_get::<String, _>("service_id").map_err(|_| Error::DbError)?.into(),
				stream: row.try_get::<String, _>("stream").map_err(|_| Error::DbError)?.into(),
				message: row.try_get::<String, _>("message").map_err(|_| Error::DbError)?.into(),
				timestamp: Timestamp(row.try_get("timestamp").map_err(|_| Error::DbError)?),
			});
		}
		Ok(logs)
	}

	/// An output sink feeding this store, one per (service, stream).
	pub fn writer(self: &Arc<Self>, service_id: &str, stream: StreamType) -> Arc<dyn OutputSink> {
		Arc::new(LogWriter { store: self.clone(), service_id: service_id.into(), stream })
	}
}

struct LogWriter {
	store: Arc<ServiceLogStore>,
	service_id: Box<str>,
	stream: StreamType,
}

#[async_trait]
impl OutputSink for LogWriter {
	async fn write(&self, data: &[u8]) {
		let message = String::from_utf8_lossy(data);
		if let Err(err) = self.store.insert_log(&self.service_id, self.stream, &message).await {
			warn!("failed to store log line for {}: {}", self.service_id, err);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn insert_and_query_in_order() {
		let store = ServiceLogStore::new().await.unwrap();
		store.insert_log("svc-1", StreamType::Stdout, "first").await.unwrap();
		store.insert_log("svc-1", StreamType::Stderr, "second").await.unwrap();
		store.insert_log("svc-2", StreamType::Stdout, "other").await.unwrap();

		let logs = store.logs_by_service("svc-1", 100).await.unwrap();
		assert_eq!(logs.len(), 2);
		assert_eq!(logs[0].message.as_ref(), "first");
		assert_eq!(logs[0].stream.as_ref(), "stdout");
		assert_eq!(logs[1].message.as_ref(), "second");
		assert_eq!(logs[1].stream.as_ref(), "stderr");
	}

	#[tokio::test]
	async fn history_is_capped_per_service() {
		let store = ServiceLogStore::new().await.unwrap();
		for i in 0..(MAX_LOGS_PER_SERVICE + 20) {
			store
				.insert_log("svc-1", StreamType::Stdout, &format!("line {}", i))
				.await
				.unwrap();
		}

		let logs = store.logs_by_service("svc-1", MAX_LOGS_PER_SERVICE).await.unwrap();
		assert_eq!(logs.len(), MAX_LOGS_PER_SERVICE as usize);
		// The oldest surviving entry is line 20
		assert_eq!(logs[0].message.as_ref(), "line 20");
	}

	#[tokio::test]
	async fn limit_returns_most_recent() {
		let store = ServiceLogStore::new().await.unwrap();
		for i in 0..10 {
			store
				.insert_log("svc-1", StreamType::Stdout, &format!("line {}", i))
				.await
				.unwrap();
		}

		let logs = store.logs_by_service("svc-1", 3).await.unwrap();
		let messages: Vec<&str> = logs.iter().map(|l| l.message.as_ref()).collect();
		assert_eq!(messages, vec!["line 7", "line 8", "line 9"]);
	}
}

// vim: ts=4
