// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, HttpConfigLayer, LogFormat, LoggingConfigLayer, MetricSinkKind,
	TelemetryConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/tally/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: TALLY_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		load_layer(&Env(|name: &str| std::env::var(name).ok()))
	}
}

/// Variable lookup, so tests can load layers without touching the process
/// environment.
struct Env<F: Fn(&str) -> Option<String>>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
	fn var(&self, name: &str) -> Option<String> {
		(self.0)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parse<T: FromStr>(&self, name: &str, type_name: &str) -> Result<Option<T>, ConfigError> {
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid {type_name} value '{v}'"),
			}),
			None => Ok(None),
		}
	}

	fn list(&self, name: &str) -> Option<Vec<String>> {
		self.var(name).map(|v| {
			v.split(',')
				.map(|s| s.trim().to_string())
				.filter(|s| !s.is_empty())
				.collect()
		})
	}
}

fn load_layer<F: Fn(&str) -> Option<String>>(
	env: &Env<F>,
) -> Result<ServerConfigLayer, ConfigError> {
	Ok(ServerConfigLayer {
		http: Some(HttpConfigLayer {
			host: env.var("TALLY_SERVER_HOST"),
			port: env.parse("TALLY_SERVER_PORT", "u16")?,
		}),
		database: Some(DatabaseConfigLayer {
			url: env.var("TALLY_SERVER_DATABASE_URL"),
			max_connections: env.parse("TALLY_SERVER_DATABASE_MAX_CONNECTIONS", "u32")?,
			busy_timeout_secs: env.parse("TALLY_SERVER_DATABASE_BUSY_TIMEOUT_SECS", "u64")?,
		}),
		logging: Some(load_logging(env)?),
		telemetry: Some(load_telemetry(env)?),
	})
}

fn load_logging<F: Fn(&str) -> Option<String>>(
	env: &Env<F>,
) -> Result<LoggingConfigLayer, ConfigError> {
	let format = match env.var("TALLY_SERVER_LOG_FORMAT") {
		Some(v) => Some(
			v.parse::<LogFormat>()
				.map_err(|message| ConfigError::InvalidValue {
					key: "TALLY_SERVER_LOG_FORMAT".to_string(),
					message,
				})?,
		),
		None => None,
	};

	Ok(LoggingConfigLayer {
		level: env.var("TALLY_SERVER_LOG_LEVEL"),
		format,
	})
}

fn load_telemetry<F: Fn(&str) -> Option<String>>(
	env: &Env<F>,
) -> Result<TelemetryConfigLayer, ConfigError> {
	let sink = match env.var("TALLY_SERVER_TELEMETRY_SINK") {
		Some(v) => Some(
			v.parse::<MetricSinkKind>()
				.map_err(|message| ConfigError::InvalidValue {
					key: "TALLY_SERVER_TELEMETRY_SINK".to_string(),
					message,
				})?,
		),
		None => None,
	};

	Ok(TelemetryConfigLayer {
		enabled: env.bool("TALLY_SERVER_TELEMETRY_ENABLED"),
		sink,
		queue_capacity: env.parse("TALLY_SERVER_TELEMETRY_QUEUE_CAPACITY", "usize")?,
		worker_count: env.parse("TALLY_SERVER_TELEMETRY_WORKER_COUNT", "usize")?,
		batch_size: env.parse("TALLY_SERVER_TELEMETRY_BATCH_SIZE", "usize")?,
		slow_command_threshold_ms: env
			.parse("TALLY_SERVER_TELEMETRY_SLOW_COMMAND_THRESHOLD_MS", "u64")?,
		command_text_max_chars: env
			.parse("TALLY_SERVER_TELEMETRY_COMMAND_TEXT_MAX_CHARS", "usize")?,
		excluded_path_prefixes: env.list("TALLY_SERVER_TELEMETRY_EXCLUDED_PATHS"),
		idle_caller_threshold_secs: env
			.parse("TALLY_SERVER_TELEMETRY_IDLE_CALLER_THRESHOLD_SECS", "u64")?,
		idle_sweep_interval_secs: env
			.parse("TALLY_SERVER_TELEMETRY_IDLE_SWEEP_INTERVAL_SECS", "u64")?,
		failed_login_window_secs: env
			.parse("TALLY_SERVER_TELEMETRY_FAILED_LOGIN_WINDOW_SECS", "u64")?,
		suspicious_attempt_threshold: env
			.parse("TALLY_SERVER_TELEMETRY_SUSPICIOUS_ATTEMPTS", "u32")?,
	})
}
