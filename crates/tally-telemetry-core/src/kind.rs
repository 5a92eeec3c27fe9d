// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five kinds of metric the pipeline persists, one store each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
	NetworkUsage,
	FailedLogin,
	SlowCommand,
	ActiveCaller,
	Transaction,
}

impl MetricKind {
	pub const ALL: [MetricKind; 5] = [
		MetricKind::NetworkUsage,
		MetricKind::FailedLogin,
		MetricKind::SlowCommand,
		MetricKind::ActiveCaller,
		MetricKind::Transaction,
	];

	/// Stable position of this kind inside [`MetricKind::ALL`].
	pub fn index(self) -> usize {
		match self {
			MetricKind::NetworkUsage => 0,
			MetricKind::FailedLogin => 1,
			MetricKind::SlowCommand => 2,
			MetricKind::ActiveCaller => 3,
			MetricKind::Transaction => 4,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			MetricKind::NetworkUsage => "network_usage",
			MetricKind::FailedLogin => "failed_login",
			MetricKind::SlowCommand => "slow_command",
			MetricKind::ActiveCaller => "active_caller",
			MetricKind::Transaction => "transaction",
		}
	}
}

impl fmt::Display for MetricKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
