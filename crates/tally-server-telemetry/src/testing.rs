// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared helpers for unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tally_telemetry_core::{MetricKind, MetricRecord, NetworkUsageRecord};

use crate::bootstrap::MetricsInfrastructure;
use crate::error::StoreError;
use crate::sink::MetricSink;

/// A single-connection in-memory database, so every query sees the same
/// schema.
pub async fn create_test_pool() -> SqlitePool {
	SqlitePoolOptions::new()
		.max_connections(1)
		.connect(":memory:")
		.await
		.expect("failed to create test pool")
}

pub async fn create_metrics_infra() -> MetricsInfrastructure {
	let infra = MetricsInfrastructure::new(create_test_pool().await);
	infra
		.run_migrations()
		.await
		.expect("failed to run metric migrations");
	infra
}

/// Current time at the precision the stores keep.
pub fn now_micros() -> DateTime<Utc> {
	Utc::now().trunc_subsecs(6)
}

/// Gives spawned workers a chance to run.
pub async fn settle() {
	tokio::time::sleep(Duration::from_millis(100)).await;
}

pub fn network_usage(path: &str) -> MetricRecord {
	MetricRecord::NetworkUsage(NetworkUsageRecord {
		path: path.to_string(),
		method: "GET".to_string(),
		bytes_sent: 0,
		bytes_received: 0,
		total_bytes: 0,
		client_address: "127.0.0.1".to_string(),
		user_agent: None,
		status_code: 200,
		duration_ms: 1,
		timestamp: now_micros(),
	})
}

#[derive(Default)]
pub struct RecordingSink {
	records: Mutex<Vec<MetricRecord>>,
}

impl RecordingSink {
	pub fn records(&self) -> Vec<MetricRecord> {
		self.records.lock().unwrap().clone()
	}

	pub fn of_kind(&self, kind: MetricKind) -> Vec<MetricRecord> {
		self
			.records()
			.into_iter()
			.filter(|r| r.kind() == kind)
			.collect()
	}
}

#[async_trait]
impl MetricSink for RecordingSink {
	fn name(&self) -> &str {
		"recording"
	}

	async fn persist(&self, record: &MetricRecord) -> Result<(), StoreError> {
		self.records.lock().unwrap().push(record.clone());
		Ok(())
	}
}
