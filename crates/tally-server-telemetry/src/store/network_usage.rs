// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tally_telemetry_core::{MetricKind, NetworkUsageRecord};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, to_i64, to_u64, MetricStore};
use crate::bootstrap::MetricsInfrastructure;
use crate::error::StoreError;

#[derive(Clone)]
pub struct NetworkUsageStore {
	pool: SqlitePool,
}

impl NetworkUsageStore {
	pub fn new(infra: &MetricsInfrastructure) -> Self {
		infra.ensure_indexes(MetricKind::NetworkUsage);
		Self {
			pool: infra.pool().clone(),
		}
	}

	/// Most recent records first.
	#[tracing::instrument(skip(self))]
	pub async fn recent(&self, limit: i64) -> Result<Vec<NetworkUsageRecord>, StoreError> {
		let rows = sqlx::query(
			r#"
			SELECT path, method, bytes_sent, bytes_received, total_bytes, client_address,
				user_agent, status_code, duration_ms, timestamp
			FROM metric_network_usage
			ORDER BY timestamp DESC, rowid DESC
			LIMIT ?
			"#,
		)
		.bind(limit)
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_record).collect()
	}
}

#[async_trait]
impl MetricStore for NetworkUsageStore {
	type Record = NetworkUsageRecord;

	fn kind(&self) -> MetricKind {
		MetricKind::NetworkUsage
	}

	#[tracing::instrument(skip(self, record), fields(path = %record.path, status = record.status_code))]
	async fn insert(&self, record: &NetworkUsageRecord) -> Result<(), StoreError> {
		sqlx::query(
			r#"
			INSERT INTO metric_network_usage (
				id, path, method, bytes_sent, bytes_received, total_bytes, client_address,
				user_agent, status_code, duration_ms, timestamp
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(Uuid::new_v4().to_string())
		.bind(&record.path)
		.bind(&record.method)
		.bind(to_i64(record.bytes_sent))
		.bind(to_i64(record.bytes_received))
		.bind(to_i64(record.total_bytes))
		.bind(&record.client_address)
		.bind(&record.user_agent)
		.bind(i64::from(record.status_code))
		.bind(to_i64(record.duration_ms))
		.bind(format_timestamp(record.timestamp))
		.execute(&self.pool)
		.await?;

		Ok(())
	}
}

fn row_to_record(row: &SqliteRow) -> Result<NetworkUsageRecord, StoreError> {
	let status_code: i64 = row.try_get("status_code")?;
	let timestamp: String = row.try_get("timestamp")?;

	Ok(NetworkUsageRecord {
		path: row.try_get("path")?,
		method: row.try_get("method")?,
		bytes_sent: to_u64(row.try_get("bytes_sent")?),
		bytes_received: to_u64(row.try_get("bytes_received")?),
		total_bytes: to_u64(row.try_get("total_bytes")?),
		client_address: row.try_get("client_address")?,
		user_agent: row.try_get("user_agent")?,
		status_code: u16::try_from(status_code).unwrap_or(0),
		duration_ms: to_u64(row.try_get("duration_ms")?),
		timestamp: parse_timestamp(&timestamp)?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_metrics_infra, now_micros};

	fn sample(path: &str, bytes_sent: u64) -> NetworkUsageRecord {
		NetworkUsageRecord {
			path: path.to_string(),
			method: "GET".to_string(),
			bytes_sent,
			bytes_received: 10,
			total_bytes: bytes_sent + 10,
			client_address: "10.1.2.3".to_string(),
			user_agent: Some("curl/8.5".to_string()),
			status_code: 200,
			duration_ms: 12,
			timestamp: now_micros(),
		}
	}

	#[tokio::test]
	async fn insert_then_read_back() {
		let infra = create_metrics_infra().await;
		let store = NetworkUsageStore::new(&infra);

		let record = sample("/api/ventas", 1024);
		store.insert(&record).await.unwrap();

		let stored = store.recent(10).await.unwrap();
		assert_eq!(stored.len(), 1);
		assert_eq!(stored[0], record);
	}

	#[tokio::test]
	async fn recent_returns_newest_first() {
		let infra = create_metrics_infra().await;
		let store = NetworkUsageStore::new(&infra);

		store.insert(&sample("/a", 1)).await.unwrap();
		store.insert(&sample("/b", 2)).await.unwrap();

		let stored = store.recent(1).await.unwrap();
		assert_eq!(stored.len(), 1);
		assert_eq!(stored[0].path, "/b");
	}
}
