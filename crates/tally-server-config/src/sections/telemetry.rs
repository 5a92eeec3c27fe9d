// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request telemetry configuration section.

use serde::{Deserialize, Serialize};

const DEFAULT_QUEUE_CAPACITY: usize = 10000;
const DEFAULT_WORKER_COUNT: usize = 4;
const DEFAULT_BATCH_SIZE: usize = 64;
const DEFAULT_SLOW_COMMAND_THRESHOLD_MS: u64 = 100;
const DEFAULT_COMMAND_TEXT_MAX_CHARS: usize = 500;
const DEFAULT_IDLE_CALLER_THRESHOLD_SECS: u64 = 30 * 60;
const DEFAULT_IDLE_SWEEP_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_FAILED_LOGIN_WINDOW_SECS: u64 = 15 * 60;
const DEFAULT_SUSPICIOUS_ATTEMPT_THRESHOLD: u32 = 5;

/// Health check, docs UI, framework assets and favicon.
pub const DEFAULT_EXCLUDED_PATH_PREFIXES: [&str; 5] = [
	"/health",
	"/swagger-ui",
	"/api-docs",
	"/_framework",
	"/favicon.ico",
];

fn default_excluded_path_prefixes() -> Vec<String> {
	DEFAULT_EXCLUDED_PATH_PREFIXES
		.iter()
		.map(|p| p.to_string())
		.collect()
}

/// Where dispatcher workers write metric batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetricSinkKind {
	#[default]
	Sqlite,
	/// Emit records as tracing events only.
	Tracing,
}

impl std::str::FromStr for MetricSinkKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"sqlite" => Ok(MetricSinkKind::Sqlite),
			"tracing" => Ok(MetricSinkKind::Tracing),
			other => Err(format!("unknown metric sink '{other}'")),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfigLayer {
	pub enabled: Option<bool>,
	pub sink: Option<MetricSinkKind>,
	pub queue_capacity: Option<usize>,
	pub worker_count: Option<usize>,
	pub batch_size: Option<usize>,
	pub slow_command_threshold_ms: Option<u64>,
	pub command_text_max_chars: Option<usize>,
	pub excluded_path_prefixes: Option<Vec<String>>,
	pub idle_caller_threshold_secs: Option<u64>,
	pub idle_sweep_interval_secs: Option<u64>,
	pub failed_login_window_secs: Option<u64>,
	pub suspicious_attempt_threshold: Option<u32>,
}

impl TelemetryConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.sink.is_some() {
			self.sink = other.sink;
		}
		if other.queue_capacity.is_some() {
			self.queue_capacity = other.queue_capacity;
		}
		if other.worker_count.is_some() {
			self.worker_count = other.worker_count;
		}
		if other.batch_size.is_some() {
			self.batch_size = other.batch_size;
		}
		if other.slow_command_threshold_ms.is_some() {
			self.slow_command_threshold_ms = other.slow_command_threshold_ms;
		}
		if other.command_text_max_chars.is_some() {
			self.command_text_max_chars = other.command_text_max_chars;
		}
		if other.excluded_path_prefixes.is_some() {
			self.excluded_path_prefixes = other.excluded_path_prefixes;
		}
		if other.idle_caller_threshold_secs.is_some() {
			self.idle_caller_threshold_secs = other.idle_caller_threshold_secs;
		}
		if other.idle_sweep_interval_secs.is_some() {
			self.idle_sweep_interval_secs = other.idle_sweep_interval_secs;
		}
		if other.failed_login_window_secs.is_some() {
			self.failed_login_window_secs = other.failed_login_window_secs;
		}
		if other.suspicious_attempt_threshold.is_some() {
			self.suspicious_attempt_threshold = other.suspicious_attempt_threshold;
		}
	}

	pub fn finalize(self) -> TelemetryConfig {
		TelemetryConfig {
			enabled: self.enabled.unwrap_or(true),
			sink: self.sink.unwrap_or_default(),
			queue_capacity: self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
			worker_count: self.worker_count.unwrap_or(DEFAULT_WORKER_COUNT),
			batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
			slow_command_threshold_ms: self
				.slow_command_threshold_ms
				.unwrap_or(DEFAULT_SLOW_COMMAND_THRESHOLD_MS),
			command_text_max_chars: self
				.command_text_max_chars
				.unwrap_or(DEFAULT_COMMAND_TEXT_MAX_CHARS),
			excluded_path_prefixes: self
				.excluded_path_prefixes
				.unwrap_or_else(default_excluded_path_prefixes),
			idle_caller_threshold_secs: self
				.idle_caller_threshold_secs
				.unwrap_or(DEFAULT_IDLE_CALLER_THRESHOLD_SECS),
			idle_sweep_interval_secs: self
				.idle_sweep_interval_secs
				.unwrap_or(DEFAULT_IDLE_SWEEP_INTERVAL_SECS),
			failed_login_window_secs: self
				.failed_login_window_secs
				.unwrap_or(DEFAULT_FAILED_LOGIN_WINDOW_SECS),
			suspicious_attempt_threshold: self
				.suspicious_attempt_threshold
				.unwrap_or(DEFAULT_SUSPICIOUS_ATTEMPT_THRESHOLD),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
	pub enabled: bool,
	pub sink: MetricSinkKind,
	pub queue_capacity: usize,
	pub worker_count: usize,
	pub batch_size: usize,
	pub slow_command_threshold_ms: u64,
	pub command_text_max_chars: usize,
	/// Request paths starting with any of these are not instrumented.
	pub excluded_path_prefixes: Vec<String>,
	pub idle_caller_threshold_secs: u64,
	pub idle_sweep_interval_secs: u64,
	pub failed_login_window_secs: u64,
	pub suspicious_attempt_threshold: u32,
}

impl Default for TelemetryConfig {
	fn default() -> Self {
		TelemetryConfigLayer::default().finalize()
	}
}
