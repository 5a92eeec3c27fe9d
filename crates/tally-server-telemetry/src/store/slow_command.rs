// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tally_telemetry_core::{MetricKind, SlowCommandRecord};
use uuid::Uuid;

use super::{format_timestamp, parse_enum, parse_timestamp, to_i64, to_u64, MetricStore};
use crate::bootstrap::MetricsInfrastructure;
use crate::error::StoreError;

#[derive(Clone)]
pub struct SlowCommandStore {
	pool: SqlitePool,
}

impl SlowCommandStore {
	pub fn new(infra: &MetricsInfrastructure) -> Self {
		infra.ensure_indexes(MetricKind::SlowCommand);
		Self {
			pool: infra.pool().clone(),
		}
	}

	#[tracing::instrument(skip(self))]
	pub async fn recent(&self, limit: i64) -> Result<Vec<SlowCommandRecord>, StoreError> {
		let rows = sqlx::query(
			r#"
			SELECT command_kind, confidence, table_name, command_text, duration_ms,
				threshold_ms, rows_affected, endpoint, caller_id, timestamp
			FROM metric_slow_commands
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
impl MetricStore for SlowCommandStore {
	type Record = SlowCommandRecord;

	fn kind(&self) -> MetricKind {
		MetricKind::SlowCommand
	}

	#[tracing::instrument(skip(self, record), fields(kind = %record.command_kind, duration_ms = record.duration_ms))]
	async fn insert(&self, record: &SlowCommandRecord) -> Result<(), StoreError> {
		sqlx::query(
			r#"
			INSERT INTO metric_slow_commands (
				id, command_kind, confidence, table_name, command_text, duration_ms,
				threshold_ms, rows_affected, endpoint, caller_id, timestamp
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(Uuid::new_v4().to_string())
		.bind(record.command_kind.to_string())
		.bind(record.confidence.to_string())
		.bind(&record.table_name)
		.bind(&record.command_text)
		.bind(to_i64(record.duration_ms))
		.bind(to_i64(record.threshold_ms))
		.bind(record.rows_affected.map(to_i64))
		.bind(&record.endpoint)
		.bind(&record.caller_id)
		.bind(format_timestamp(record.timestamp))
		.execute(&self.pool)
		.await?;

		Ok(())
	}
}

fn row_to_record(row: &SqliteRow) -> Result<SlowCommandRecord, StoreError> {
	let command_kind: String = row.try_get("command_kind")?;
	let confidence: String = row.try_get("confidence")?;
	let rows_affected: Option<i64> = row.try_get("rows_affected")?;
	let timestamp: String = row.try_get("timestamp")?;

	Ok(SlowCommandRecord {
		command_kind: parse_enum(&command_kind)?,
		confidence: parse_enum(&confidence)?,
		table_name: row.try_get("table_name")?,
		command_text: row.try_get("command_text")?,
		duration_ms: to_u64(row.try_get("duration_ms")?),
		threshold_ms: to_u64(row.try_get("threshold_ms")?),
		rows_affected: rows_affected.map(to_u64),
		endpoint: row.try_get("endpoint")?,
		caller_id: row.try_get("caller_id")?,
		timestamp: parse_timestamp(&timestamp)?,
	})
}
