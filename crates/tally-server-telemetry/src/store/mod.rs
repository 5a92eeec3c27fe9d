// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed metric stores, one per [`MetricKind`].

pub mod active_caller;
pub mod failed_login;
pub mod network_usage;
pub mod schema;
pub mod slow_command;
pub mod transaction;

pub use active_caller::ActiveCallerStore;
pub use failed_login::FailedLoginStore;
pub use network_usage::NetworkUsageStore;
pub use schema::{index_specs, run_migrations, IndexSpec};
pub use slow_command::SlowCommandStore;
pub use transaction::TransactionStore;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tally_telemetry_core::MetricKind;

use crate::error::StoreError;

/// Append-only destination for one kind of metric record.
#[async_trait]
pub trait MetricStore: Send + Sync {
	type Record: Send + Sync;

	fn kind(&self) -> MetricKind;

	async fn insert(&self, record: &Self::Record) -> Result<(), StoreError>;
}

/// Fixed-width UTC timestamps so that text order is chronological order.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
	DateTime::parse_from_rfc3339(s)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| StoreError::Permanent(format!("invalid timestamp '{s}': {e}")))
}

/// `now - age`, clamped to the earliest representable instant.
pub(crate) fn cutoff_before(now: DateTime<Utc>, age: std::time::Duration) -> DateTime<Utc> {
	chrono::Duration::from_std(age)
		.ok()
		.and_then(|age| now.checked_sub_signed(age))
		.unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub(crate) fn to_i64(v: u64) -> i64 {
	i64::try_from(v).unwrap_or(i64::MAX)
}

pub(crate) fn to_u64(v: i64) -> u64 {
	u64::try_from(v).unwrap_or(0)
}

pub(crate) fn parse_enum<T>(value: &str) -> Result<T, StoreError>
where
	T: std::str::FromStr,
	T::Err: std::fmt::Display,
{
	value
		.parse()
		.map_err(|e: T::Err| StoreError::Permanent(e.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn timestamps_sort_lexically() {
		let earlier = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
		let later = earlier + chrono::Duration::microseconds(1500);
		let a = format_timestamp(earlier);
		let b = format_timestamp(later);
		assert_eq!(a.len(), b.len());
		assert!(a < b);
		assert_eq!(parse_timestamp(&b).unwrap(), later);
	}

	#[test]
	fn cutoff_saturates_on_huge_ages() {
		let now = Utc::now();
		assert_eq!(
			cutoff_before(now, std::time::Duration::from_secs(u64::MAX)),
			DateTime::<Utc>::MIN_UTC
		);
		assert_eq!(
			cutoff_before(now, std::time::Duration::from_secs(60)),
			now - chrono::Duration::seconds(60)
		);
	}

	#[test]
	fn integer_conversions_clamp() {
		assert_eq!(to_i64(u64::MAX), i64::MAX);
		assert_eq!(to_u64(-5), 0);
		assert_eq!(to_u64(42), 42);
	}
}
