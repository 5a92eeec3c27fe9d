// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Metric store database configuration.

use serde::Deserialize;

const DEFAULT_DATABASE_URL: &str = "sqlite:./tally-metrics.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;

/// Resolved settings for the SQLite pool backing the metric stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
	pub url: String,
	/// Upper bound shared by dispatcher workers, recorders and request handlers.
	pub max_connections: u32,
	/// How long a writer waits on a locked database before giving up.
	pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		DatabaseConfigLayer::default().finalize()
	}
}

impl DatabaseConfig {
	/// Only SQLite URLs are accepted; the stores rely on SQLite upsert syntax.
	pub fn validate(&self) -> Result<(), String> {
		if !self.url.starts_with("sqlite:") {
			return Err(format!(
				"database.url must be a sqlite: URL, got '{}'",
				self.url
			));
		}
		if self.max_connections == 0 {
			return Err("database.max_connections must be greater than zero".to_string());
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfigLayer {
	#[serde(default)]
	pub url: Option<String>,
	#[serde(default)]
	pub max_connections: Option<u32>,
	#[serde(default)]
	pub busy_timeout_secs: Option<u64>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: DatabaseConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
		if other.max_connections.is_some() {
			self.max_connections = other.max_connections;
		}
		if other.busy_timeout_secs.is_some() {
			self.busy_timeout_secs = other.busy_timeout_secs;
		}
	}

	pub fn finalize(self) -> DatabaseConfig {
		DatabaseConfig {
			url: self.url.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
			max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
			busy_timeout_secs: self.busy_timeout_secs.unwrap_or(DEFAULT_BUSY_TIMEOUT_SECS),
		}
	}
}
