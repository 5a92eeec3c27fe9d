// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::SqlitePool;
use tally_telemetry_core::MetricKind;

use crate::error::StoreError;

pub const NETWORK_USAGE_TABLE: &str = "metric_network_usage";
pub const FAILED_LOGINS_TABLE: &str = "metric_failed_logins";
pub const SLOW_COMMANDS_TABLE: &str = "metric_slow_commands";
pub const ACTIVE_CALLERS_TABLE: &str = "metric_active_callers";
pub const TRANSACTIONS_TABLE: &str = "metric_transactions";

const MIGRATIONS: [&str; 5] = [
	r#"
	CREATE TABLE IF NOT EXISTS metric_network_usage (
		id TEXT PRIMARY KEY,
		path TEXT NOT NULL,
		method TEXT NOT NULL,
		bytes_sent INTEGER NOT NULL,
		bytes_received INTEGER NOT NULL,
		total_bytes INTEGER NOT NULL,
		client_address TEXT NOT NULL,
		user_agent TEXT,
		status_code INTEGER NOT NULL,
		duration_ms INTEGER NOT NULL,
		timestamp TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS metric_failed_logins (
		id TEXT PRIMARY KEY,
		username TEXT,
		ip_address TEXT NOT NULL,
		user_agent TEXT,
		failure_reason TEXT NOT NULL,
		is_suspicious INTEGER NOT NULL DEFAULT 0,
		attempt_count INTEGER NOT NULL,
		timestamp TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS metric_slow_commands (
		id TEXT PRIMARY KEY,
		command_kind TEXT NOT NULL,
		confidence TEXT NOT NULL,
		table_name TEXT,
		command_text TEXT NOT NULL,
		duration_ms INTEGER NOT NULL,
		threshold_ms INTEGER NOT NULL,
		rows_affected INTEGER,
		endpoint TEXT,
		caller_id TEXT,
		timestamp TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS metric_active_callers (
		caller_id TEXT PRIMARY KEY NOT NULL,
		display_name TEXT NOT NULL,
		role TEXT,
		session_start TEXT NOT NULL,
		last_activity TEXT NOT NULL,
		ip_address TEXT,
		request_count INTEGER NOT NULL DEFAULT 1,
		is_active INTEGER NOT NULL DEFAULT 1,
		timestamp TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS metric_transactions (
		id TEXT PRIMARY KEY,
		kind TEXT NOT NULL,
		reference_id TEXT NOT NULL,
		amount INTEGER NOT NULL,
		caller_id TEXT,
		counterparty_id TEXT,
		status TEXT NOT NULL,
		item_count INTEGER NOT NULL DEFAULT 0,
		payment_method TEXT,
		duration_ms INTEGER,
		ip_address TEXT,
		timestamp TEXT NOT NULL
	)
	"#,
];

/// Creates the metric tables. Idempotent; indexes are created separately by
/// the bootstrap guard.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
	for ddl in MIGRATIONS {
		sqlx::query(ddl).execute(pool).await?;
	}
	tracing::debug!("metric tables ready");
	Ok(())
}

/// A secondary index on a metric table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
	pub name: &'static str,
	pub table: &'static str,
	pub columns: &'static str,
}

impl IndexSpec {
	const fn new(name: &'static str, table: &'static str, columns: &'static str) -> Self {
		Self {
			name,
			table,
			columns,
		}
	}

	pub fn create_sql(&self) -> String {
		format!(
			"CREATE INDEX IF NOT EXISTS {} ON {} ({})",
			self.name, self.table, self.columns
		)
	}
}

const NETWORK_USAGE_INDEXES: [IndexSpec; 3] = [
	IndexSpec::new("idx_network_usage_timestamp", NETWORK_USAGE_TABLE, "timestamp"),
	IndexSpec::new("idx_network_usage_path", NETWORK_USAGE_TABLE, "path"),
	IndexSpec::new("idx_network_usage_client", NETWORK_USAGE_TABLE, "client_address"),
];

const FAILED_LOGIN_INDEXES: [IndexSpec; 3] = [
	IndexSpec::new("idx_failed_logins_timestamp", FAILED_LOGINS_TABLE, "timestamp"),
	IndexSpec::new("idx_failed_logins_ip", FAILED_LOGINS_TABLE, "ip_address, timestamp"),
	IndexSpec::new("idx_failed_logins_username", FAILED_LOGINS_TABLE, "username"),
];

const SLOW_COMMAND_INDEXES: [IndexSpec; 3] = [
	IndexSpec::new("idx_slow_commands_timestamp", SLOW_COMMANDS_TABLE, "timestamp"),
	IndexSpec::new("idx_slow_commands_duration", SLOW_COMMANDS_TABLE, "duration_ms"),
	IndexSpec::new("idx_slow_commands_kind", SLOW_COMMANDS_TABLE, "command_kind"),
];

const ACTIVE_CALLER_INDEXES: [IndexSpec; 2] = [
	IndexSpec::new("idx_active_callers_last_activity", ACTIVE_CALLERS_TABLE, "last_activity"),
	IndexSpec::new("idx_active_callers_is_active", ACTIVE_CALLERS_TABLE, "is_active"),
];

const TRANSACTION_INDEXES: [IndexSpec; 4] = [
	IndexSpec::new("idx_transactions_timestamp", TRANSACTIONS_TABLE, "timestamp"),
	IndexSpec::new("idx_transactions_kind", TRANSACTIONS_TABLE, "kind"),
	IndexSpec::new("idx_transactions_caller", TRANSACTIONS_TABLE, "caller_id"),
	IndexSpec::new("idx_transactions_reference", TRANSACTIONS_TABLE, "reference_id"),
];

/// The indexes backing one metric store.
pub fn index_specs(kind: MetricKind) -> &'static [IndexSpec] {
	match kind {
		MetricKind::NetworkUsage => &NETWORK_USAGE_INDEXES,
		MetricKind::FailedLogin => &FAILED_LOGIN_INDEXES,
		MetricKind::SlowCommand => &SLOW_COMMAND_INDEXES,
		MetricKind::ActiveCaller => &ACTIVE_CALLER_INDEXES,
		MetricKind::Transaction => &TRANSACTION_INDEXES,
	}
}
