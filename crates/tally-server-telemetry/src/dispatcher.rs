// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Detached persistence of metric records.
//!
//! Producers call [`MetricsDispatcher::submit`], which never waits: the
//! record goes onto a bounded queue or, when the queue is full, is dropped
//! and counted. A fixed pool of workers drains the queue in small batches
//! and hands each record to the configured [`MetricSink`]. Sink errors and
//! panics stop at the worker boundary.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tally_server_config::TelemetryConfig;
use tally_telemetry_core::MetricRecord;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::sink::MetricSink;

const DROP_WARN_EVERY: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherOptions {
	pub queue_capacity: usize,
	pub worker_count: usize,
	pub batch_size: usize,
}

impl Default for DispatcherOptions {
	fn default() -> Self {
		Self::from(&TelemetryConfig::default())
	}
}

impl From<&TelemetryConfig> for DispatcherOptions {
	fn from(config: &TelemetryConfig) -> Self {
		Self {
			queue_capacity: config.queue_capacity,
			worker_count: config.worker_count,
			batch_size: config.batch_size,
		}
	}
}

#[derive(Debug, Default)]
struct Counters {
	enqueued: AtomicU64,
	dropped: AtomicU64,
	persisted: AtomicU64,
	failed: AtomicU64,
}

/// Point-in-time copy of the dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
	pub enqueued: u64,
	pub dropped: u64,
	pub persisted: u64,
	pub failed: u64,
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<MetricRecord>>>;

pub struct MetricsDispatcher {
	tx: mpsc::Sender<MetricRecord>,
	counters: Arc<Counters>,
	shutdown: watch::Sender<bool>,
	workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl MetricsDispatcher {
	/// Starts the worker pool. Must be called from within a tokio runtime.
	pub fn new(options: DispatcherOptions, sink: Arc<dyn MetricSink>) -> Self {
		let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
		let (shutdown, _) = watch::channel(false);
		let rx: SharedReceiver = Arc::new(Mutex::new(rx));
		let counters = Arc::new(Counters::default());
		let batch_size = options.batch_size.max(1);

		let workers = (0..options.worker_count.max(1))
			.map(|id| {
				tokio::spawn(run_worker(
					id,
					Arc::clone(&rx),
					Arc::clone(&sink),
					Arc::clone(&counters),
					batch_size,
					shutdown.subscribe(),
				))
			})
			.collect();

		debug!(
			sink = sink.name(),
			queue_capacity = options.queue_capacity,
			worker_count = options.worker_count,
			batch_size,
			"metrics dispatcher started"
		);

		Self {
			tx,
			counters,
			shutdown,
			workers: std::sync::Mutex::new(workers),
		}
	}

	/// Queues a record for persistence.
	///
	/// Returns `true` if the record was queued, `false` if it was dropped
	/// because the queue is full or the dispatcher is shutting down.
	pub fn submit(&self, record: MetricRecord) -> bool {
		if *self.shutdown.borrow() {
			self.record_drop(&record, "dispatcher shut down");
			return false;
		}

		match self.tx.try_send(record) {
			Ok(()) => {
				self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
				true
			}
			Err(mpsc::error::TrySendError::Full(record)) => {
				self.record_drop(&record, "queue full");
				false
			}
			Err(mpsc::error::TrySendError::Closed(record)) => {
				self.record_drop(&record, "queue closed");
				false
			}
		}
	}

	fn record_drop(&self, record: &MetricRecord, reason: &'static str) {
		let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
		if dropped == 1 || dropped % DROP_WARN_EVERY == 0 {
			warn!(kind = %record.kind(), reason, dropped, "dropping metric record");
		} else {
			debug!(kind = %record.kind(), reason, dropped, "dropping metric record");
		}
	}

	pub fn stats(&self) -> DispatcherStats {
		DispatcherStats {
			enqueued: self.counters.enqueued.load(Ordering::Relaxed),
			dropped: self.counters.dropped.load(Ordering::Relaxed),
			persisted: self.counters.persisted.load(Ordering::Relaxed),
			failed: self.counters.failed.load(Ordering::Relaxed),
		}
	}

	/// Stops accepting records, lets the workers drain what is already
	/// queued, and waits for them to exit.
	pub async fn shutdown(&self) {
		self.shutdown.send_replace(true);

		let workers = match self.workers.lock() {
			Ok(mut guard) => std::mem::take(&mut *guard),
			Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
		};

		for worker in workers {
			if let Err(e) = worker.await {
				error!(error = %e, "metrics worker ended abnormally");
			}
		}

		let stats = self.stats();
		debug!(
			persisted = stats.persisted,
			failed = stats.failed,
			dropped = stats.dropped,
			"metrics dispatcher stopped"
		);
	}
}

async fn run_worker(
	id: usize,
	rx: SharedReceiver,
	sink: Arc<dyn MetricSink>,
	counters: Arc<Counters>,
	batch_size: usize,
	mut shutdown: watch::Receiver<bool>,
) {
	let mut batch = Vec::with_capacity(batch_size);

	loop {
		{
			let mut rx = rx.lock().await;
			tokio::select! {
				biased;
				record = rx.recv() => match record {
					Some(record) => batch.push(record),
					None => break,
				},
				_ = shutdown.changed() => break,
			}
			fill_batch(&mut rx, &mut batch, batch_size);
		}

		persist_batch(sink.as_ref(), &counters, &mut batch).await;
	}

	// Drain whatever was queued before shutdown.
	loop {
		{
			let mut rx = rx.lock().await;
			fill_batch(&mut rx, &mut batch, batch_size);
		}
		if batch.is_empty() {
			break;
		}
		persist_batch(sink.as_ref(), &counters, &mut batch).await;
	}

	debug!(worker = id, "metrics worker exiting");
}

fn fill_batch(rx: &mut mpsc::Receiver<MetricRecord>, batch: &mut Vec<MetricRecord>, batch_size: usize) {
	while batch.len() < batch_size {
		match rx.try_recv() {
			Ok(record) => batch.push(record),
			Err(_) => break,
		}
	}
}

async fn persist_batch(sink: &dyn MetricSink, counters: &Counters, batch: &mut Vec<MetricRecord>) {
	for record in batch.drain(..) {
		match AssertUnwindSafe(sink.persist(&record)).catch_unwind().await {
			Ok(Ok(())) => {
				counters.persisted.fetch_add(1, Ordering::Relaxed);
			}
			Ok(Err(e)) => {
				counters.failed.fetch_add(1, Ordering::Relaxed);
				warn!(sink = sink.name(), kind = %record.kind(), error = %e, "failed to persist metric");
			}
			Err(_) => {
				counters.failed.fetch_add(1, Ordering::Relaxed);
				error!(sink = sink.name(), kind = %record.kind(), "metric sink panicked");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::StoreError;
	use crate::testing::{network_usage, settle, RecordingSink};
	use async_trait::async_trait;
	use std::sync::atomic::AtomicUsize;
	use tokio::sync::Semaphore;

	fn options(queue_capacity: usize, worker_count: usize, batch_size: usize) -> DispatcherOptions {
		DispatcherOptions {
			queue_capacity,
			worker_count,
			batch_size,
		}
	}

	struct GatedSink {
		gate: Semaphore,
		inner: RecordingSink,
	}

	#[async_trait]
	impl MetricSink for GatedSink {
		fn name(&self) -> &str {
			"gated"
		}

		async fn persist(&self, record: &MetricRecord) -> Result<(), StoreError> {
			if let Ok(permit) = self.gate.acquire().await {
				permit.forget();
			}
			self.inner.persist(record).await
		}
	}

	struct FlakySink {
		inner: RecordingSink,
	}

	#[async_trait]
	impl MetricSink for FlakySink {
		fn name(&self) -> &str {
			"flaky"
		}

		async fn persist(&self, record: &MetricRecord) -> Result<(), StoreError> {
			if let MetricRecord::NetworkUsage(r) = record {
				if r.path.contains("fail") {
					return Err(StoreError::Transient("database is locked".to_string()));
				}
			}
			self.inner.persist(record).await
		}
	}

	struct PanickyOnceSink {
		calls: AtomicUsize,
		inner: RecordingSink,
	}

	#[async_trait]
	impl MetricSink for PanickyOnceSink {
		fn name(&self) -> &str {
			"panicky"
		}

		async fn persist(&self, record: &MetricRecord) -> Result<(), StoreError> {
			if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
				panic!("sink exploded");
			}
			self.inner.persist(record).await
		}
	}

	#[tokio::test]
	async fn delivers_submitted_records() {
		let sink = Arc::new(RecordingSink::default());
		let dispatcher = MetricsDispatcher::new(options(100, 4, 8), sink.clone());

		for i in 0..20 {
			assert!(dispatcher.submit(network_usage(&format!("/api/{i}"))));
		}
		settle().await;

		assert_eq!(sink.records().len(), 20);
		assert_eq!(
			dispatcher.stats(),
			DispatcherStats {
				enqueued: 20,
				dropped: 0,
				persisted: 20,
				failed: 0,
			}
		);
	}

	#[tokio::test]
	async fn overflow_is_dropped_and_counted() {
		let sink = Arc::new(GatedSink {
			gate: Semaphore::new(0),
			inner: RecordingSink::default(),
		});
		let dispatcher = MetricsDispatcher::new(options(2, 1, 1), sink.clone());

		let accepted = (0..10)
			.filter(|i| dispatcher.submit(network_usage(&format!("/api/{i}"))))
			.count() as u64;

		let stats = dispatcher.stats();
		assert!(stats.dropped >= 7, "dropped {}", stats.dropped);
		assert_eq!(stats.enqueued, accepted);
		assert_eq!(stats.enqueued + stats.dropped, 10);

		sink.gate.add_permits(100);
		settle().await;
		assert_eq!(dispatcher.stats().persisted, accepted);
		assert_eq!(sink.inner.records().len() as u64, accepted);
	}

	#[tokio::test]
	async fn failing_record_does_not_block_later_ones() {
		let sink = Arc::new(FlakySink {
			inner: RecordingSink::default(),
		});
		let dispatcher = MetricsDispatcher::new(options(100, 1, 4), sink.clone());

		dispatcher.submit(network_usage("/api/fail"));
		dispatcher.submit(network_usage("/api/ok-1"));
		dispatcher.submit(network_usage("/api/ok-2"));
		settle().await;

		let stats = dispatcher.stats();
		assert_eq!(stats.failed, 1);
		assert_eq!(stats.persisted, 2);
		assert_eq!(sink.inner.records().len(), 2);
	}

	#[tokio::test]
	async fn panicking_sink_is_contained() {
		let sink = Arc::new(PanickyOnceSink {
			calls: AtomicUsize::new(0),
			inner: RecordingSink::default(),
		});
		let dispatcher = MetricsDispatcher::new(options(100, 1, 1), sink.clone());

		dispatcher.submit(network_usage("/boom"));
		dispatcher.submit(network_usage("/after"));
		settle().await;

		let stats = dispatcher.stats();
		assert_eq!(stats.failed, 1);
		assert_eq!(stats.persisted, 1);
		assert_eq!(sink.inner.records().len(), 1);
	}

	#[tokio::test]
	async fn shutdown_drains_queue_then_rejects() {
		let sink = Arc::new(RecordingSink::default());
		let dispatcher = MetricsDispatcher::new(options(100, 2, 4), sink.clone());

		for i in 0..10 {
			dispatcher.submit(network_usage(&format!("/api/{i}")));
		}
		dispatcher.shutdown().await;
		assert_eq!(sink.records().len(), 10);

		assert!(!dispatcher.submit(network_usage("/late")));
		assert_eq!(dispatcher.stats().dropped, 1);
	}

	#[test]
	fn options_follow_config() {
		let config = TelemetryConfig {
			queue_capacity: 7,
			worker_count: 3,
			batch_size: 2,
			..TelemetryConfig::default()
		};
		assert_eq!(DispatcherOptions::from(&config), options(7, 3, 2));
	}
}
