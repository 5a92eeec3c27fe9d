// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tally_telemetry_core::{MetricKind, TransactionRecord};
use uuid::Uuid;

use super::{format_timestamp, parse_enum, parse_timestamp, to_i64, to_u64, MetricStore};
use crate::bootstrap::MetricsInfrastructure;
use crate::error::StoreError;

#[derive(Clone)]
pub struct TransactionStore {
	pool: SqlitePool,
}

impl TransactionStore {
	pub fn new(infra: &MetricsInfrastructure) -> Self {
		infra.ensure_indexes(MetricKind::Transaction);
		Self {
			pool: infra.pool().clone(),
		}
	}

	#[tracing::instrument(skip(self))]
	pub async fn recent(&self, limit: i64) -> Result<Vec<TransactionRecord>, StoreError> {
		let rows = sqlx::query(
			r#"
			SELECT kind, reference_id, amount, caller_id, counterparty_id, status, item_count,
				payment_method, duration_ms, ip_address, timestamp
			FROM metric_transactions
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
impl MetricStore for TransactionStore {
	type Record = TransactionRecord;

	fn kind(&self) -> MetricKind {
		MetricKind::Transaction
	}

	#[tracing::instrument(skip(self, record), fields(kind = %record.kind, reference_id = %record.reference_id))]
	async fn insert(&self, record: &TransactionRecord) -> Result<(), StoreError> {
		sqlx::query(
			r#"
			INSERT INTO metric_transactions (
				id, kind, reference_id, amount, caller_id, counterparty_id, status, item_count,
				payment_method, duration_ms, ip_address, timestamp
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(Uuid::new_v4().to_string())
		.bind(record.kind.to_string())
		.bind(&record.reference_id)
		.bind(record.amount)
		.bind(&record.caller_id)
		.bind(&record.counterparty_id)
		.bind(record.status.to_string())
		.bind(i64::from(record.item_count))
		.bind(&record.payment_method)
		.bind(record.duration_ms.map(to_i64))
		.bind(&record.ip_address)
		.bind(format_timestamp(record.timestamp))
		.execute(&self.pool)
		.await?;

		Ok(())
	}
}

fn row_to_record(row: &SqliteRow) -> Result<TransactionRecord, StoreError> {
	let kind: String = row.try_get("kind")?;
	let status: String = row.try_get("status")?;
	let item_count: i64 = row.try_get("item_count")?;
	let duration_ms: Option<i64> = row.try_get("duration_ms")?;
	let timestamp: String = row.try_get("timestamp")?;

	Ok(TransactionRecord {
		kind: parse_enum(&kind)?,
		reference_id: row.try_get("reference_id")?,
		amount: row.try_get("amount")?,
		caller_id: row.try_get("caller_id")?,
		counterparty_id: row.try_get("counterparty_id")?,
		status: parse_enum(&status)?,
		item_count: u32::try_from(item_count).unwrap_or(u32::MAX),
		payment_method: row.try_get("payment_method")?,
		duration_ms: duration_ms.map(to_u64),
		ip_address: row.try_get("ip_address")?,
		timestamp: parse_timestamp(&timestamp)?,
	})
}
