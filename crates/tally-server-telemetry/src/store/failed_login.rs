// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tally_telemetry_core::{FailedLoginRecord, MetricKind};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, to_u64, MetricStore};
use crate::bootstrap::MetricsInfrastructure;
use crate::error::StoreError;

#[derive(Clone)]
pub struct FailedLoginStore {
	pool: SqlitePool,
}

impl FailedLoginStore {
	pub fn new(infra: &MetricsInfrastructure) -> Self {
		infra.ensure_indexes(MetricKind::FailedLogin);
		Self {
			pool: infra.pool().clone(),
		}
	}

	/// Number of failures recorded from `ip_address` at or after `since`.
	#[tracing::instrument(skip(self))]
	pub async fn count_by_ip_since(
		&self,
		ip_address: &str,
		since: DateTime<Utc>,
	) -> Result<u64, StoreError> {
		let count: i64 = sqlx::query_scalar(
			r#"
			SELECT COUNT(*) FROM metric_failed_logins
			WHERE ip_address = ? AND timestamp >= ?
			"#,
		)
		.bind(ip_address)
		.bind(format_timestamp(since))
		.fetch_one(&self.pool)
		.await?;

		Ok(to_u64(count))
	}

	#[tracing::instrument(skip(self))]
	pub async fn recent(&self, limit: i64) -> Result<Vec<FailedLoginRecord>, StoreError> {
		let rows = sqlx::query(
			r#"
			SELECT username, ip_address, user_agent, failure_reason, is_suspicious,
				attempt_count, timestamp
			FROM metric_failed_logins
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
impl MetricStore for FailedLoginStore {
	type Record = FailedLoginRecord;

	fn kind(&self) -> MetricKind {
		MetricKind::FailedLogin
	}

	#[tracing::instrument(skip(self, record), fields(ip = %record.ip_address))]
	async fn insert(&self, record: &FailedLoginRecord) -> Result<(), StoreError> {
		sqlx::query(
			r#"
			INSERT INTO metric_failed_logins (
				id, username, ip_address, user_agent, failure_reason, is_suspicious,
				attempt_count, timestamp
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(Uuid::new_v4().to_string())
		.bind(&record.username)
		.bind(&record.ip_address)
		.bind(&record.user_agent)
		.bind(&record.failure_reason)
		.bind(record.is_suspicious)
		.bind(i64::from(record.attempt_count))
		.bind(format_timestamp(record.timestamp))
		.execute(&self.pool)
		.await?;

		Ok(())
	}
}

fn row_to_record(row: &SqliteRow) -> Result<FailedLoginRecord, StoreError> {
	let attempt_count: i64 = row.try_get("attempt_count")?;
	let timestamp: String = row.try_get("timestamp")?;

	Ok(FailedLoginRecord {
		username: row.try_get("username")?,
		ip_address: row.try_get("ip_address")?,
		user_agent: row.try_get("user_agent")?,
		failure_reason: row.try_get("failure_reason")?,
		is_suspicious: row.try_get("is_suspicious")?,
		attempt_count: u32::try_from(attempt_count).unwrap_or(u32::MAX),
		timestamp: parse_timestamp(&timestamp)?,
	})
}
