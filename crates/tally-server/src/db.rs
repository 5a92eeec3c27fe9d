// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;
use tally_server_config::DatabaseConfig;

use crate::error::ServerError;

/// Create a SqlitePool with WAL mode for the metric store.
#[tracing::instrument(skip(config), fields(max_connections = config.max_connections))]
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, ServerError> {
	let options = SqliteConnectOptions::from_str(&config.url)
		.map_err(|e| ServerError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.busy_timeout(Duration::from_secs(config.busy_timeout_secs))
		.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(config.max_connections)
		.connect_with(options)
		.await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config_for(url: String) -> DatabaseConfig {
		DatabaseConfig {
			url,
			max_connections: 2,
			..Default::default()
		}
	}

	#[tokio::test]
	async fn creates_database_file_in_wal_mode() {
		let dir = tempfile::tempdir().unwrap();
		let url = format!("sqlite:{}", dir.path().join("metrics.db").display());

		let pool = create_pool(&config_for(url)).await.unwrap();
		let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
			.fetch_one(&pool)
			.await
			.unwrap();
		assert_eq!(mode.to_lowercase(), "wal");
		assert_eq!(pool.options().get_max_connections(), 2);

		pool.close().await;
	}

	#[tokio::test]
	async fn rejects_invalid_url() {
		let config = config_for("sqlite:metrics.db?no_such_option=1".to_string());
		assert!(create_pool(&config).await.is_err());
	}
}
