// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Timing of outgoing database commands.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sqlx::sqlite::{SqliteQueryResult, SqliteRow};
use tally_server_config::TelemetryConfig;
use tally_telemetry_core::{classify_command, truncate_command_text, MetricRecord, SlowCommandRecord};
use tracing::debug;

use crate::dispatcher::MetricsDispatcher;

/// Where a command was issued from, if known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandContext {
	pub endpoint: Option<String>,
	pub caller_id: Option<String>,
}

impl CommandContext {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.endpoint = Some(endpoint.into());
		self
	}

	pub fn with_caller(mut self, caller_id: impl Into<String>) -> Self {
		self.caller_id = Some(caller_id.into());
		self
	}
}

/// Execution results that may report how many rows they touched.
pub trait RowsAffected {
	fn rows_affected(&self) -> Option<u64> {
		None
	}
}

impl RowsAffected for SqliteQueryResult {
	fn rows_affected(&self) -> Option<u64> {
		Some(SqliteQueryResult::rows_affected(self))
	}
}

impl RowsAffected for u64 {
	fn rows_affected(&self) -> Option<u64> {
		Some(*self)
	}
}

impl RowsAffected for SqliteRow {}
impl RowsAffected for () {}
impl<T> RowsAffected for Vec<T> {}
impl<T> RowsAffected for Option<T> {}

#[derive(Clone)]
pub struct CommandTimingInterceptor {
	dispatcher: Arc<MetricsDispatcher>,
	threshold: Duration,
	max_text_chars: usize,
	enabled: bool,
}

impl CommandTimingInterceptor {
	pub fn new(dispatcher: Arc<MetricsDispatcher>, threshold: Duration, max_text_chars: usize) -> Self {
		Self {
			dispatcher,
			threshold,
			max_text_chars,
			enabled: true,
		}
	}

	pub fn from_config(dispatcher: Arc<MetricsDispatcher>, config: &TelemetryConfig) -> Self {
		Self {
			dispatcher,
			threshold: Duration::from_millis(config.slow_command_threshold_ms),
			max_text_chars: config.command_text_max_chars,
			enabled: config.enabled,
		}
	}

	pub fn threshold(&self) -> Duration {
		self.threshold
	}

	/// Runs `execution`, timing it, and returns its result unchanged.
	///
	/// Commands at or above the threshold are classified and queued as a
	/// [`SlowCommandRecord`]; failed executions are timed too but report no
	/// row count.
	pub async fn intercept<F, T, E>(
		&self,
		command_text: &str,
		context: &CommandContext,
		execution: F,
	) -> Result<T, E>
	where
		F: Future<Output = Result<T, E>>,
		T: RowsAffected,
	{
		let started = Instant::now();
		let result = execution.await;
		let elapsed = started.elapsed();

		let rows = result.as_ref().ok().and_then(|value| RowsAffected::rows_affected(value));
		self.observe(command_text, elapsed, rows, context);

		result
	}

	/// Post-execution hook for callers that time commands themselves.
	///
	/// Returns the record that was queued, if the command was slow.
	pub fn observe(
		&self,
		command_text: &str,
		elapsed: Duration,
		rows_affected: Option<u64>,
		context: &CommandContext,
	) -> Option<SlowCommandRecord> {
		if !self.enabled || elapsed < self.threshold {
			return None;
		}

		let classification = classify_command(command_text);
		let record = SlowCommandRecord {
			command_kind: classification.kind,
			confidence: classification.confidence,
			table_name: classification.table_name,
			command_text: truncate_command_text(command_text, self.max_text_chars),
			duration_ms: duration_ms(elapsed),
			threshold_ms: duration_ms(self.threshold),
			rows_affected,
			endpoint: context.endpoint.clone(),
			caller_id: context.caller_id.clone(),
			timestamp: Utc::now(),
		};

		debug!(
			kind = %record.command_kind,
			table = record.table_name.as_deref().unwrap_or(""),
			duration_ms = record.duration_ms,
			"slow command"
		);
		self
			.dispatcher
			.submit(MetricRecord::SlowCommand(record.clone()));

		Some(record)
	}
}

fn duration_ms(d: Duration) -> u64 {
	u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dispatcher::DispatcherOptions;
	use crate::testing::{create_test_pool, settle, RecordingSink};
	use tally_telemetry_core::{ClassificationConfidence, CommandKind, MetricKind};

	fn interceptor(threshold_ms: u64) -> (CommandTimingInterceptor, Arc<RecordingSink>) {
		let sink = Arc::new(RecordingSink::default());
		let dispatcher = Arc::new(MetricsDispatcher::new(DispatcherOptions::default(), sink.clone()));
		let interceptor =
			CommandTimingInterceptor::new(dispatcher, Duration::from_millis(threshold_ms), 500);
		(interceptor, sink)
	}

	async fn sleep_then<T>(ms: u64, value: T) -> Result<T, std::io::Error> {
		tokio::time::sleep(Duration::from_millis(ms)).await;
		Ok(value)
	}

	#[tokio::test]
	async fn slow_command_is_recorded() {
		let (interceptor, sink) = interceptor(100);
		let ctx = CommandContext::new()
			.with_endpoint("GET /api/ventas/1")
			.with_caller("u-4");

		let rows = interceptor
			.intercept("SELECT * FROM Ventas WHERE Id=1", &ctx, sleep_then(150, 1u64))
			.await
			.unwrap();
		assert_eq!(rows, 1);
		settle().await;

		let records = sink.of_kind(MetricKind::SlowCommand);
		assert_eq!(records.len(), 1);
		let MetricRecord::SlowCommand(record) = &records[0] else {
			panic!("expected a slow command record");
		};
		assert!(record.duration_ms >= 150);
		assert_eq!(record.threshold_ms, 100);
		assert_eq!(record.command_kind, CommandKind::Select);
		assert_eq!(record.table_name.as_deref(), Some("Ventas"));
		assert_eq!(record.confidence, ClassificationConfidence::Confident);
		assert_eq!(record.rows_affected, Some(1));
		assert_eq!(record.endpoint.as_deref(), Some("GET /api/ventas/1"));
		assert_eq!(record.caller_id.as_deref(), Some("u-4"));
	}

	#[tokio::test]
	async fn fast_command_is_not_recorded() {
		let (interceptor, sink) = interceptor(100);

		interceptor
			.intercept("SELECT 1", &CommandContext::new(), sleep_then(50, ()))
			.await
			.unwrap();
		settle().await;

		assert!(sink.records().is_empty());
	}

	#[tokio::test]
	async fn errors_pass_through_unchanged_and_are_timed() {
		let (interceptor, sink) = interceptor(0);

		let result: Result<(), &str> = interceptor
			.intercept("DELETE FROM Stock", &CommandContext::new(), async { Err("constraint") })
			.await;
		assert_eq!(result, Err("constraint"));
		settle().await;

		let records = sink.records();
		assert_eq!(records.len(), 1);
		let MetricRecord::SlowCommand(record) = &records[0] else {
			panic!("expected a slow command record");
		};
		assert_eq!(record.command_kind, CommandKind::Delete);
		assert_eq!(record.rows_affected, None);
	}

	#[test]
	fn observe_truncates_and_tolerates_garbage() {
		let sink = Arc::new(RecordingSink::default());
		let rt = tokio::runtime::Builder::new_current_thread()
			.enable_all()
			.build()
			.unwrap();
		let _guard = rt.enter();
		let dispatcher = Arc::new(MetricsDispatcher::new(DispatcherOptions::default(), sink));
		let interceptor = CommandTimingInterceptor::new(dispatcher, Duration::from_millis(100), 10);

		let text = "ñ".repeat(40);
		let record = interceptor
			.observe(&text, Duration::from_millis(300), None, &CommandContext::new())
			.unwrap();
		assert_eq!(record.command_text.chars().count(), 10);
		assert_eq!(record.command_kind, CommandKind::Unknown);
		assert_eq!(record.table_name, None);
		assert_eq!(record.confidence, ClassificationConfidence::Unclassified);

		assert!(interceptor
			.observe("SELECT 1", Duration::from_millis(99), None, &CommandContext::new())
			.is_none());
	}

	#[tokio::test]
	async fn wraps_real_sqlite_execution() {
		let (interceptor, sink) = interceptor(0);
		let pool = create_test_pool().await;
		sqlx::query("CREATE TABLE Productos (Id INTEGER PRIMARY KEY, Nombre TEXT)")
			.execute(&pool)
			.await
			.unwrap();

		let text = "INSERT INTO Productos (Nombre) VALUES ('cafe'), ('te')";
		let result = interceptor
			.intercept(text, &CommandContext::new(), sqlx::query(text).execute(&pool))
			.await
			.unwrap();
		assert_eq!(result.rows_affected(), 2);
		settle().await;

		let records = sink.records();
		let MetricRecord::SlowCommand(record) = &records[0] else {
			panic!("expected a slow command record");
		};
		assert_eq!(record.command_kind, CommandKind::Insert);
		assert_eq!(record.table_name.as_deref(), Some("Productos"));
		assert_eq!(record.rows_affected, Some(2));
	}

	#[tokio::test]
	async fn disabled_interceptor_records_nothing() {
		let sink = Arc::new(RecordingSink::default());
		let dispatcher = Arc::new(MetricsDispatcher::new(DispatcherOptions::default(), sink.clone()));
		let config = TelemetryConfig {
			enabled: false,
			..TelemetryConfig::default()
		};
		let interceptor = CommandTimingInterceptor::from_config(dispatcher, &config);

		assert!(interceptor
			.observe("SELECT 1", Duration::from_secs(5), None, &CommandContext::new())
			.is_none());
		settle().await;
		assert!(sink.records().is_empty());
	}
}
