// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{TelemetryError, TelemetryResult};
use crate::store::ActiveCallerStore;

/// `tokio::time::interval` panics on a zero period.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Periodically marks callers inactive once they have been idle longer than
/// the threshold.
#[derive(Clone)]
pub struct IdleCallerSweep {
	store: ActiveCallerStore,
	threshold: Duration,
}

impl IdleCallerSweep {
	pub fn new(store: ActiveCallerStore, threshold: Duration) -> Self {
		Self { store, threshold }
	}

	pub async fn run_once(&self) -> TelemetryResult<u64> {
		let deactivated = self
			.store
			.bulk_deactivate_older_than(self.threshold)
			.await
			.map_err(|e| TelemetryError::store("active_caller", e))?;

		if deactivated > 0 {
			info!(deactivated, threshold_secs = self.threshold.as_secs(), "deactivated idle callers");
		} else {
			debug!("no idle callers to deactivate");
		}
		Ok(deactivated)
	}

	/// Runs the sweep every `interval` until the returned handle is aborted.
	/// The first run happens after one full interval.
	pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
		let interval = if interval < MIN_SWEEP_INTERVAL {
			warn!(
				requested_ms = interval.as_millis() as u64,
				"idle caller sweep interval too small, clamping"
			);
			MIN_SWEEP_INTERVAL
		} else {
			interval
		};

		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			ticker.tick().await;

			loop {
				ticker.tick().await;
				if let Err(e) = self.run_once().await {
					warn!(error = %e, "idle caller sweep failed");
				}
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_metrics_infra, now_micros};
	use tally_telemetry_core::{CallerActivity, CallerIdentity};

	async fn seed(store: &ActiveCallerStore, caller_id: &str, idle: chrono::Duration) {
		let identity = CallerIdentity::new(caller_id, caller_id);
		store
			.upsert_by_caller_id(&CallerActivity::from_identity(&identity, None, now_micros() - idle))
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn run_once_reports_deactivated_count() {
		let infra = create_metrics_infra().await;
		let store = ActiveCallerStore::new(&infra);
		seed(&store, "idle", chrono::Duration::hours(1)).await;
		seed(&store, "busy", chrono::Duration::seconds(10)).await;

		let sweep = IdleCallerSweep::new(store.clone(), Duration::from_secs(1800));
		assert_eq!(sweep.run_once().await.unwrap(), 1);
		assert_eq!(sweep.run_once().await.unwrap(), 0);
		assert!(store.get("busy").await.unwrap().unwrap().is_active);
	}

	#[tokio::test]
	async fn spawned_sweep_runs_periodically() {
		let infra = create_metrics_infra().await;
		let store = ActiveCallerStore::new(&infra);
		seed(&store, "idle", chrono::Duration::hours(1)).await;

		let handle = IdleCallerSweep::new(store.clone(), Duration::from_secs(1800))
			.spawn(Duration::from_millis(20));
		tokio::time::sleep(Duration::from_millis(150)).await;
		handle.abort();

		assert!(!store.get("idle").await.unwrap().unwrap().is_active);
	}

	#[tokio::test]
	async fn zero_interval_is_clamped_instead_of_panicking() {
		let infra = create_metrics_infra().await;
		let store = ActiveCallerStore::new(&infra);
		seed(&store, "idle", chrono::Duration::hours(1)).await;

		let handle = IdleCallerSweep::new(store.clone(), Duration::from_secs(1800))
			.spawn(Duration::ZERO);
		tokio::time::sleep(Duration::from_millis(100)).await;

		assert!(!handle.is_finished());
		handle.abort();
		assert!(!store.get("idle").await.unwrap().unwrap().is_active);
	}

	#[tokio::test]
	async fn failures_are_logged_not_propagated() {
		let infra = create_metrics_infra().await;
		let store = ActiveCallerStore::new(&infra);
		sqlx::query("DROP TABLE metric_active_callers")
			.execute(infra.pool())
			.await
			.unwrap();

		let sweep = IdleCallerSweep::new(store, Duration::from_secs(60));
		assert!(sweep.run_once().await.is_err());

		let handle = sweep.spawn(Duration::from_millis(10));
		tokio::time::sleep(Duration::from_millis(50)).await;
		assert!(!handle.is_finished());
		handle.abort();
	}
}
