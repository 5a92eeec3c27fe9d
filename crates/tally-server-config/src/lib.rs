// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for Tally server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`TALLY_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use tally_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Server listening on {}:{}", config.http.host, config.http.port);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
	pub telemetry: TelemetryConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`TALLY_SERVER_*`)
/// 2. Config file (`/etc/tally/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize();
	let database = layer.database.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();
	let telemetry = layer.telemetry.unwrap_or_default().finalize();

	database.validate().map_err(ConfigError::Validation)?;
	validate_telemetry(&telemetry)?;

	info!(
		host = %http.host,
		port = http.port,
		database = %database.url,
		telemetry_enabled = telemetry.enabled,
		queue_capacity = telemetry.queue_capacity,
		worker_count = telemetry.worker_count,
		slow_command_threshold_ms = telemetry.slow_command_threshold_ms,
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		http,
		database,
		logging,
		telemetry,
	})
}

/// Validate cross-field telemetry rules.
fn validate_telemetry(telemetry: &TelemetryConfig) -> Result<(), ConfigError> {
	if telemetry.queue_capacity == 0 {
		return Err(ConfigError::Validation(
			"telemetry.queue_capacity must be greater than zero".to_string(),
		));
	}
	if telemetry.worker_count == 0 {
		return Err(ConfigError::Validation(
			"telemetry.worker_count must be greater than zero".to_string(),
		));
	}
	if telemetry.idle_sweep_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"telemetry.idle_sweep_interval_secs must be greater than zero".to_string(),
		));
	}
	if telemetry.batch_size == 0 {
		return Err(ConfigError::Validation(
			"telemetry.batch_size must be greater than zero".to_string(),
		));
	}
	if telemetry
		.excluded_path_prefixes
		.iter()
		.any(|p| p.trim().is_empty())
	{
		return Err(ConfigError::Validation(
			"telemetry.excluded_path_prefixes must not contain empty entries, \
			 an empty prefix would exclude every request"
				.to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_pass_validation() {
		let config = finalize(ServerConfigLayer::default()).unwrap();
		assert_eq!(config.socket_addr(), "0.0.0.0:8080");
		assert_eq!(config.logging.level, "info");
		assert!(config.telemetry.enabled);
	}

	#[test]
	fn test_zero_queue_capacity_rejected() {
		let layer = ServerConfigLayer {
			telemetry: Some(TelemetryConfigLayer {
				queue_capacity: Some(0),
				..Default::default()
			}),
			..Default::default()
		};
		assert!(matches!(finalize(layer), Err(ConfigError::Validation(_))));
	}

	#[test]
	fn test_zero_workers_rejected() {
		let telemetry = TelemetryConfig {
			worker_count: 0,
			..Default::default()
		};
		assert!(validate_telemetry(&telemetry).is_err());
	}

	#[test]
	fn test_zero_sweep_interval_rejected() {
		let layer = ServerConfigLayer {
			telemetry: Some(TelemetryConfigLayer {
				idle_sweep_interval_secs: Some(0),
				..Default::default()
			}),
			..Default::default()
		};
		let err = finalize(layer).unwrap_err();
		assert!(err.to_string().contains("idle_sweep_interval_secs"));
	}

	#[test]
	fn test_non_sqlite_database_rejected() {
		let layer = ServerConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: Some("mysql://localhost/tally".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		assert!(matches!(finalize(layer), Err(ConfigError::Validation(_))));
	}

	#[test]
	fn test_empty_excluded_prefix_rejected() {
		let telemetry = TelemetryConfig {
			excluded_path_prefixes: vec!["/health".to_string(), " ".to_string()],
			..Default::default()
		};
		assert!(validate_telemetry(&telemetry).is_err());
	}

	#[test]
	fn test_later_sources_win() {
		struct Fixed(Precedence, ServerConfigLayer);

		impl ConfigSource for Fixed {
			fn name(&self) -> &'static str {
				"fixed"
			}

			fn precedence(&self) -> Precedence {
				self.0
			}

			fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
				Ok(self.1.clone())
			}
		}

		let file = ServerConfigLayer {
			telemetry: Some(TelemetryConfigLayer {
				worker_count: Some(2),
				batch_size: Some(8),
				..Default::default()
			}),
			..Default::default()
		};
		let env = ServerConfigLayer {
			telemetry: Some(TelemetryConfigLayer {
				worker_count: Some(6),
				..Default::default()
			}),
			..Default::default()
		};

		let config = load_from_sources(vec![
			Box::new(Fixed(Precedence::Environment, env)),
			Box::new(Fixed(Precedence::ConfigFile, file)),
		])
		.unwrap();

		assert_eq!(config.telemetry.worker_count, 6);
		assert_eq!(config.telemetry.batch_size, 8);
	}
}
