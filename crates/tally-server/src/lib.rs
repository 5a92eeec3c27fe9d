// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tally HTTP server.

pub mod db;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use sqlx::SqlitePool;
use tally_server_telemetry::{instrument_requests, Telemetry};

pub use error::{Result, ServerError};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
	pub pool: SqlitePool,
	pub telemetry: Arc<Telemetry>,
}

/// Builds the router with request instrumentation applied to every route.
pub fn create_router(state: AppState) -> Router {
	let request_telemetry = state.telemetry.request_telemetry();

	Router::new()
		.route("/health", get(routes::health::health_check))
		.route("/api/telemetry/stats", get(routes::telemetry::dispatcher_stats))
		.with_state(state)
		.layer(from_fn_with_state(request_telemetry, instrument_requests))
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{
		body::Body,
		http::{Request, StatusCode},
	};
	use sqlx::sqlite::SqlitePoolOptions;
	use tally_server_config::TelemetryConfig;
	use tally_server_telemetry::{DispatcherStats, NetworkUsageStore};
	use tower::ServiceExt;

	async fn test_state() -> AppState {
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect(":memory:")
			.await
			.unwrap();
		let telemetry = Telemetry::start(pool.clone(), TelemetryConfig::default())
			.await
			.unwrap();
		AppState {
			pool,
			telemetry: Arc::new(telemetry),
		}
	}

	async fn body_json(response: axum::response::Response) -> serde_json::Value {
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		serde_json::from_slice(&bytes).unwrap()
	}

	#[tokio::test]
	async fn health_reports_ok_and_is_not_instrumented() {
		let state = test_state().await;
		let app = create_router(state.clone());

		let response = app
			.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let json = body_json(response).await;
		assert_eq!(json["status"], "healthy");
		assert_eq!(json["database"], "ok");

		tokio::time::sleep(std::time::Duration::from_millis(100)).await;
		assert_eq!(state.telemetry.stats(), DispatcherStats::default());
	}

	#[tokio::test]
	async fn stats_requests_are_instrumented() {
		let state = test_state().await;
		let app = create_router(state.clone());

		let response = app
			.clone()
			.oneshot(
				Request::builder()
					.uri("/api/telemetry/stats")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let json = body_json(response).await;
		assert_eq!(json["dropped"], 0);

		tokio::time::sleep(std::time::Duration::from_millis(100)).await;
		let recorded = NetworkUsageStore::new(state.telemetry.infrastructure())
			.recent(10)
			.await
			.unwrap();
		assert_eq!(recorded.len(), 1);
		assert_eq!(recorded[0].path, "/api/telemetry/stats");
		assert_eq!(state.telemetry.stats().persisted, 1);
	}
}
