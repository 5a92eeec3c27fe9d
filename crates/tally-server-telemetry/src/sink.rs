// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use tally_telemetry_core::MetricRecord;

use crate::bootstrap::MetricsInfrastructure;
use crate::error::StoreError;
use crate::store::{
	ActiveCallerStore, FailedLoginStore, MetricStore, NetworkUsageStore, SlowCommandStore,
	TransactionStore,
};

/// Destination for records drained by the dispatcher workers.
#[async_trait]
pub trait MetricSink: Send + Sync {
	fn name(&self) -> &str;

	async fn persist(&self, record: &MetricRecord) -> Result<(), StoreError>;

	async fn health_check(&self) -> Result<(), StoreError> {
		Ok(())
	}
}

/// Routes each record to the SQLite store for its kind. Caller activity is
/// applied as an upsert rather than appended.
pub struct SqliteMetricSink {
	network_usage: NetworkUsageStore,
	failed_logins: FailedLoginStore,
	slow_commands: SlowCommandStore,
	active_callers: ActiveCallerStore,
	transactions: TransactionStore,
}

impl SqliteMetricSink {
	pub fn new(infra: &MetricsInfrastructure) -> Self {
		Self {
			network_usage: NetworkUsageStore::new(infra),
			failed_logins: FailedLoginStore::new(infra),
			slow_commands: SlowCommandStore::new(infra),
			active_callers: ActiveCallerStore::new(infra),
			transactions: TransactionStore::new(infra),
		}
	}
}

#[async_trait]
impl MetricSink for SqliteMetricSink {
	fn name(&self) -> &str {
		"sqlite"
	}

	async fn persist(&self, record: &MetricRecord) -> Result<(), StoreError> {
		match record {
			MetricRecord::NetworkUsage(r) => self.network_usage.insert(r).await,
			MetricRecord::FailedLogin(r) => self.failed_logins.insert(r).await,
			MetricRecord::SlowCommand(r) => self.slow_commands.insert(r).await,
			MetricRecord::CallerActivity(a) => self.active_callers.upsert_by_caller_id(a).await,
			MetricRecord::Transaction(r) => self.transactions.insert(r).await,
		}
	}

	async fn health_check(&self) -> Result<(), StoreError> {
		self.network_usage.recent(1).await.map(|_| ())
	}
}

/// Writes records to the log instead of a database. Useful in development
/// and when the metric store is unavailable.
#[derive(Debug, Default)]
pub struct TracingMetricSink;

#[async_trait]
impl MetricSink for TracingMetricSink {
	fn name(&self) -> &str {
		"tracing"
	}

	async fn persist(&self, record: &MetricRecord) -> Result<(), StoreError> {
		let json = serde_json::to_string(record)
			.map_err(|e| StoreError::Permanent(format!("failed to serialize metric: {e}")))?;
		tracing::info!(target: "tally::metrics", kind = %record.kind(), metric = %json, "metric");
		Ok(())
	}
}
