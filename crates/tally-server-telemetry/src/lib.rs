// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request and database-command telemetry for the Tally server.
//!
//! Instrumentation points ([`instrument_requests`] and
//! [`CommandTimingInterceptor`]) build metric records and hand them to a
//! [`MetricsDispatcher`], which persists them off the request path. Nothing
//! in here can fail or slow down the request being observed beyond an
//! in-memory copy and a non-blocking enqueue.

pub mod bootstrap;
pub mod dispatcher;
pub mod error;
pub mod interceptor;
pub mod middleware;
pub mod recorders;
pub mod sink;
pub mod store;
pub mod sweep;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tally_server_config::{MetricSinkKind, TelemetryConfig};
use tokio::task::JoinHandle;
use tracing::info;

pub use bootstrap::{BootstrapGuard, IndexBuilder, MetricsInfrastructure, SqliteIndexBuilder};
pub use dispatcher::{DispatcherOptions, DispatcherStats, MetricsDispatcher};
pub use error::{StoreError, TelemetryError, TelemetryResult};
pub use interceptor::{CommandContext, CommandTimingInterceptor, RowsAffected};
pub use middleware::{instrument_requests, RequestTelemetry};
pub use recorders::{FailedLoginAttempt, FailedLoginRecorder, TransactionRecorder};
pub use sink::{MetricSink, SqliteMetricSink, TracingMetricSink};
pub use store::{
	ActiveCallerStore, FailedLoginStore, MetricStore, NetworkUsageStore, SlowCommandStore,
	TransactionStore,
};
pub use sweep::IdleCallerSweep;

/// Everything the server needs to instrument itself, built once at startup.
pub struct Telemetry {
	infra: Arc<MetricsInfrastructure>,
	dispatcher: Arc<MetricsDispatcher>,
	sink: Arc<dyn MetricSink>,
	config: TelemetryConfig,
}

impl Telemetry {
	/// Creates the metric tables, then starts the dispatcher with the sink
	/// named in `config`.
	pub async fn start(pool: SqlitePool, config: TelemetryConfig) -> TelemetryResult<Self> {
		let infra = MetricsInfrastructure::new(pool);
		infra
			.run_migrations()
			.await
			.map_err(|e| TelemetryError::store("migrations", e))?;

		let sink: Arc<dyn MetricSink> = match config.sink {
			MetricSinkKind::Sqlite => Arc::new(SqliteMetricSink::new(&infra)),
			MetricSinkKind::Tracing => Arc::new(TracingMetricSink),
		};

		Ok(Self::with_sink(infra, sink, config))
	}

	pub fn with_sink(
		infra: MetricsInfrastructure,
		sink: Arc<dyn MetricSink>,
		config: TelemetryConfig,
	) -> Self {
		info!(
			sink = sink.name(),
			enabled = config.enabled,
			queue_capacity = config.queue_capacity,
			workers = config.worker_count,
			"telemetry started"
		);
		let dispatcher = Arc::new(MetricsDispatcher::new(
			DispatcherOptions::from(&config),
			Arc::clone(&sink),
		));

		Self {
			infra: Arc::new(infra),
			dispatcher,
			sink,
			config,
		}
	}

	pub fn infrastructure(&self) -> &Arc<MetricsInfrastructure> {
		&self.infra
	}

	pub fn dispatcher(&self) -> &Arc<MetricsDispatcher> {
		&self.dispatcher
	}

	pub fn config(&self) -> &TelemetryConfig {
		&self.config
	}

	pub fn request_telemetry(&self) -> RequestTelemetry {
		RequestTelemetry::from_config(Arc::clone(&self.dispatcher), &self.config)
	}

	pub fn command_interceptor(&self) -> CommandTimingInterceptor {
		CommandTimingInterceptor::from_config(Arc::clone(&self.dispatcher), &self.config)
	}

	pub fn failed_login_recorder(&self) -> FailedLoginRecorder {
		FailedLoginRecorder::from_config(&self.infra, &self.config)
	}

	pub fn transaction_recorder(&self) -> TransactionRecorder {
		TransactionRecorder::from_infrastructure(&self.infra)
	}

	pub fn idle_caller_sweep(&self) -> IdleCallerSweep {
		IdleCallerSweep::new(
			ActiveCallerStore::new(&self.infra),
			Duration::from_secs(self.config.idle_caller_threshold_secs),
		)
	}

	pub fn spawn_idle_caller_sweep(&self) -> JoinHandle<()> {
		self
			.idle_caller_sweep()
			.spawn(Duration::from_secs(self.config.idle_sweep_interval_secs))
	}

	pub async fn sink_health(&self) -> Result<(), StoreError> {
		self.sink.health_check().await
	}

	pub fn stats(&self) -> DispatcherStats {
		self.dispatcher.stats()
	}

	pub async fn shutdown(&self) {
		self.dispatcher.shutdown().await;
	}
}
