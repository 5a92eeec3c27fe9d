// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One-shot index initialization for the metric stores.
//!
//! [`MetricsInfrastructure`] is built once at startup and passed by reference
//! to every store constructor. It holds a [`BootstrapGuard`] per
//! [`MetricKind`]; the first store of a kind claims the guard and spawns
//! index creation in the background. The guard is claimed before the work
//! finishes, so a failed or interrupted bootstrap is not retried for the
//! lifetime of the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tally_telemetry_core::MetricKind;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{index_specs, run_migrations, IndexSpec};

/// Creates a single secondary index.
#[async_trait]
pub trait IndexBuilder: Send + Sync {
	async fn create_index(&self, spec: &IndexSpec) -> Result<(), StoreError>;
}

pub struct SqliteIndexBuilder {
	pool: SqlitePool,
}

impl SqliteIndexBuilder {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl IndexBuilder for SqliteIndexBuilder {
	async fn create_index(&self, spec: &IndexSpec) -> Result<(), StoreError> {
		sqlx::query(&spec.create_sql()).execute(&self.pool).await?;
		Ok(())
	}
}

/// Atomic do-once flag.
#[derive(Debug, Default)]
pub struct BootstrapGuard {
	claimed: AtomicBool,
}

impl BootstrapGuard {
	/// Returns `true` for exactly one caller.
	pub fn try_claim(&self) -> bool {
		self
			.claimed
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
	}

	pub fn is_claimed(&self) -> bool {
		self.claimed.load(Ordering::Acquire)
	}
}

pub struct MetricsInfrastructure {
	pool: SqlitePool,
	index_builder: Arc<dyn IndexBuilder>,
	guards: [BootstrapGuard; MetricKind::ALL.len()],
}

impl MetricsInfrastructure {
	pub fn new(pool: SqlitePool) -> Self {
		let index_builder = Arc::new(SqliteIndexBuilder::new(pool.clone()));
		Self::with_index_builder(pool, index_builder)
	}

	pub fn with_index_builder(pool: SqlitePool, index_builder: Arc<dyn IndexBuilder>) -> Self {
		Self {
			pool,
			index_builder,
			guards: Default::default(),
		}
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	pub async fn run_migrations(&self) -> Result<(), StoreError> {
		run_migrations(&self.pool).await
	}

	/// Dispatches index creation for `kind` unless it has already been
	/// dispatched. Returns `true` when this call did the dispatching.
	///
	/// Without a tokio runtime nothing is spawned and the guard stays
	/// unclaimed, so a later call from inside a runtime still bootstraps.
	pub fn ensure_indexes(&self, kind: MetricKind) -> bool {
		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			debug!(kind = %kind, "no async runtime, deferring index bootstrap");
			return false;
		};

		if !self.guards[kind.index()].try_claim() {
			return false;
		}

		let builder = Arc::clone(&self.index_builder);
		handle.spawn(async move {
			for spec in index_specs(kind) {
				if let Err(e) = builder.create_index(spec).await {
					warn!(kind = %kind, index = spec.name, error = %e, "failed to create metric index");
				}
			}
			debug!(kind = %kind, "metric index bootstrap finished");
		});

		true
	}

	pub fn is_bootstrapped(&self, kind: MetricKind) -> bool {
		self.guards[kind.index()].is_claimed()
	}
}
