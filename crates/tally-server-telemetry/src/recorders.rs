// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Writers awaited directly by the login flow and by services that complete
//! business transactions.

use std::time::Duration;

use chrono::Utc;
use tally_server_config::TelemetryConfig;
use tally_telemetry_core::{FailedLoginRecord, TransactionRecord};
use tracing::{instrument, warn};

use crate::bootstrap::MetricsInfrastructure;
use crate::error::{TelemetryError, TelemetryResult};
use crate::store::{cutoff_before, FailedLoginStore, MetricStore, TransactionStore};

/// A rejected login as reported by the auth flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedLoginAttempt {
	pub username: Option<String>,
	pub ip_address: String,
	pub user_agent: Option<String>,
	pub failure_reason: String,
}

impl FailedLoginAttempt {
	pub fn new(ip_address: impl Into<String>, failure_reason: impl Into<String>) -> Self {
		Self {
			username: None,
			ip_address: ip_address.into(),
			user_agent: None,
			failure_reason: failure_reason.into(),
		}
	}

	pub fn username(mut self, username: impl Into<String>) -> Self {
		self.username = Some(username.into());
		self
	}

	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());
		self
	}
}

#[derive(Clone)]
pub struct FailedLoginRecorder {
	store: FailedLoginStore,
	window: Duration,
	suspicious_threshold: u32,
}

impl FailedLoginRecorder {
	pub fn new(store: FailedLoginStore, window: Duration, suspicious_threshold: u32) -> Self {
		Self {
			store,
			window,
			suspicious_threshold,
		}
	}

	pub fn from_config(infra: &MetricsInfrastructure, config: &TelemetryConfig) -> Self {
		Self::new(
			FailedLoginStore::new(infra),
			Duration::from_secs(config.failed_login_window_secs),
			config.suspicious_attempt_threshold,
		)
	}

	/// Stores the attempt, numbering it among the failures from the same
	/// address inside the window and flagging it once that count reaches the
	/// threshold.
	#[instrument(skip(self, attempt), fields(ip = %attempt.ip_address))]
	pub async fn record(&self, attempt: FailedLoginAttempt) -> TelemetryResult<FailedLoginRecord> {
		let now = Utc::now();
		let prior = self
			.store
			.count_by_ip_since(&attempt.ip_address, cutoff_before(now, self.window))
			.await
			.map_err(|e| TelemetryError::store("failed_login", e))?;

		let attempt_count = u32::try_from(prior).unwrap_or(u32::MAX).saturating_add(1);
		let is_suspicious = attempt_count >= self.suspicious_threshold;

		let record = FailedLoginRecord {
			username: attempt.username,
			ip_address: attempt.ip_address,
			user_agent: attempt.user_agent,
			failure_reason: attempt.failure_reason,
			is_suspicious,
			attempt_count,
			timestamp: now,
		};

		if is_suspicious {
			warn!(
				ip = %record.ip_address,
				username = record.username.as_deref().unwrap_or(""),
				attempt_count,
				"suspicious login activity"
			);
		}

		self
			.store
			.insert(&record)
			.await
			.map_err(|e| TelemetryError::store("failed_login", e))?;

		Ok(record)
	}
}

#[derive(Clone)]
pub struct TransactionRecorder {
	store: TransactionStore,
}

impl TransactionRecorder {
	pub fn new(store: TransactionStore) -> Self {
		Self { store }
	}

	pub fn from_infrastructure(infra: &MetricsInfrastructure) -> Self {
		Self::new(TransactionStore::new(infra))
	}

	#[instrument(skip(self, record), fields(kind = %record.kind, reference_id = %record.reference_id))]
	pub async fn record(&self, record: &TransactionRecord) -> TelemetryResult<()> {
		self
			.store
			.insert(record)
			.await
			.map_err(|e| TelemetryError::store("transaction", e))
	}
}
