// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[derive(Error, Debug)]
pub enum TelemetryError {
	#[error("metric queue is at capacity")]
	QueueFull,

	#[error("store '{store}' error: {source}")]
	Store {
		store: String,
		#[source]
		source: StoreError,
	},

	#[error("configuration error: {0}")]
	Config(String),

	#[error("telemetry is shutting down")]
	Shutdown,
}

impl TelemetryError {
	pub fn store(store: impl Into<String>, source: StoreError) -> Self {
		TelemetryError::Store {
			store: store.into(),
			source,
		}
	}
}

#[derive(Error, Debug)]
pub enum StoreError {
	#[error("transient error: {0}")]
	Transient(String),

	#[error("permanent error: {0}")]
	Permanent(String),
}

impl StoreError {
	pub fn is_transient(&self) -> bool {
		matches!(self, StoreError::Transient(_))
	}
}

impl From<sqlx::Error> for StoreError {
	fn from(e: sqlx::Error) -> Self {
		if is_transient_error(&e) {
			StoreError::Transient(format!("database error: {e}"))
		} else {
			StoreError::Permanent(format!("database error: {e}"))
		}
	}
}

fn is_transient_error(e: &sqlx::Error) -> bool {
	match e {
		sqlx::Error::Io(_) => true,
		sqlx::Error::PoolTimedOut => true,
		sqlx::Error::PoolClosed => true,
		sqlx::Error::Database(db_err) => {
			let msg = db_err.message().to_lowercase();
			msg.contains("busy") || msg.contains("locked") || msg.contains("timeout")
		}
		_ => false,
	}
}
