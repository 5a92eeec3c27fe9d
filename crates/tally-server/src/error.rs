// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tally_server_config::ConfigError;
use tally_server_telemetry::TelemetryError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("Database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("Configuration error: {0}")]
	Config(#[from] ConfigError),

	#[error("Telemetry error: {0}")]
	Telemetry(#[from] TelemetryError),

	#[error("Internal: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
