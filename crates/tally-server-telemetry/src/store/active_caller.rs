// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Active-caller tracking.
//!
//! One row per caller id. Touches are applied with a single
//! `INSERT ... ON CONFLICT DO UPDATE` so concurrent requests from the same
//! caller never lose an increment.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tally_telemetry_core::{ActiveCallerRecord, CallerActivity, MetricKind};

use super::{cutoff_before, format_timestamp, parse_timestamp, to_i64, to_u64, MetricStore};
use crate::bootstrap::MetricsInfrastructure;
use crate::error::StoreError;

const SELECT_COLUMNS: &str = "caller_id, display_name, role, session_start, last_activity, \
	ip_address, request_count, is_active, timestamp";

#[derive(Clone)]
pub struct ActiveCallerStore {
	pool: SqlitePool,
}

impl ActiveCallerStore {
	pub fn new(infra: &MetricsInfrastructure) -> Self {
		infra.ensure_indexes(MetricKind::ActiveCaller);
		Self {
			pool: infra.pool().clone(),
		}
	}

	/// Applies one observed request.
	///
	/// A new caller starts a session with `request_count = 1`. An existing one
	/// gets its count incremented, is reactivated, and has display name, role
	/// and address refreshed. `last_activity` never moves backwards, so
	/// touches that arrive out of order are harmless.
	#[tracing::instrument(skip(self, activity), fields(caller_id = %activity.caller_id))]
	pub async fn upsert_by_caller_id(&self, activity: &CallerActivity) -> Result<(), StoreError> {
		let observed_at = format_timestamp(activity.observed_at);
		let now = format_timestamp(Utc::now());

		sqlx::query(
			r#"
			INSERT INTO metric_active_callers (
				caller_id, display_name, role, session_start, last_activity, ip_address,
				request_count, is_active, timestamp
			) VALUES (?, ?, ?, ?, ?, ?, 1, 1, ?)
			ON CONFLICT(caller_id) DO UPDATE SET
				display_name = excluded.display_name,
				role = COALESCE(excluded.role, metric_active_callers.role),
				last_activity = MAX(metric_active_callers.last_activity, excluded.last_activity),
				ip_address = COALESCE(excluded.ip_address, metric_active_callers.ip_address),
				request_count = metric_active_callers.request_count + 1,
				is_active = 1,
				timestamp = excluded.timestamp
			"#,
		)
		.bind(&activity.caller_id)
		.bind(&activity.display_name)
		.bind(&activity.role)
		.bind(&observed_at)
		.bind(&observed_at)
		.bind(&activity.ip_address)
		.bind(&now)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// Marks every active caller whose last activity is before `cutoff` as
	/// inactive. Returns the number of rows changed.
	#[tracing::instrument(skip(self))]
	pub async fn deactivate_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
		let result = sqlx::query(
			r#"
			UPDATE metric_active_callers
			SET is_active = 0
			WHERE is_active = 1 AND last_activity < ?
			"#,
		)
		.bind(format_timestamp(cutoff))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	/// Deactivates callers idle for longer than `threshold`.
	pub async fn bulk_deactivate_older_than(&self, threshold: Duration) -> Result<u64, StoreError> {
		self.deactivate_before(cutoff_before(Utc::now(), threshold))
			.await
	}

	#[tracing::instrument(skip(self))]
	pub async fn get(&self, caller_id: &str) -> Result<Option<ActiveCallerRecord>, StoreError> {
		let row = sqlx::query(&format!(
			"SELECT {SELECT_COLUMNS} FROM metric_active_callers WHERE caller_id = ?"
		))
		.bind(caller_id)
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(row_to_record).transpose()
	}

	/// Active callers, most recently seen first.
	#[tracing::instrument(skip(self))]
	pub async fn list_active(&self, limit: i64) -> Result<Vec<ActiveCallerRecord>, StoreError> {
		let rows = sqlx::query(&format!(
			"SELECT {SELECT_COLUMNS} FROM metric_active_callers \
			 WHERE is_active = 1 ORDER BY last_activity DESC LIMIT ?"
		))
		.bind(limit)
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_record).collect()
	}
}

#[async_trait]
impl MetricStore for ActiveCallerStore {
	type Record = ActiveCallerRecord;

	fn kind(&self) -> MetricKind {
		MetricKind::ActiveCaller
	}

	/// Writes a full record, replacing any existing row for the caller.
	#[tracing::instrument(skip(self, record), fields(caller_id = %record.caller_id))]
	async fn insert(&self, record: &ActiveCallerRecord) -> Result<(), StoreError> {
		sqlx::query(
			r#"
			INSERT OR REPLACE INTO metric_active_callers (
				caller_id, display_name, role, session_start, last_activity, ip_address,
				request_count, is_active, timestamp
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&record.caller_id)
		.bind(&record.display_name)
		.bind(&record.role)
		.bind(format_timestamp(record.session_start))
		.bind(format_timestamp(record.last_activity))
		.bind(&record.ip_address)
		.bind(to_i64(record.request_count))
		.bind(record.is_active)
		.bind(format_timestamp(record.timestamp))
		.execute(&self.pool)
		.await?;

		Ok(())
	}
}

fn row_to_record(row: &SqliteRow) -> Result<ActiveCallerRecord, StoreError> {
	let session_start: String = row.try_get("session_start")?;
	let last_activity: String = row.try_get("last_activity")?;
	let timestamp: String = row.try_get("timestamp")?;

	Ok(ActiveCallerRecord {
		caller_id: row.try_get("caller_id")?,
		display_name: row.try_get("display_name")?,
		role: row.try_get("role")?,
		session_start: parse_timestamp(&session_start)?,
		last_activity: parse_timestamp(&last_activity)?,
		ip_address: row.try_get("ip_address")?,
		request_count: to_u64(row.try_get("request_count")?),
		is_active: row.try_get("is_active")?,
		timestamp: parse_timestamp(&timestamp)?,
	})
}
