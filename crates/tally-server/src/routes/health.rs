// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Health check handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	pub status: &'static str,
	pub database: &'static str,
	pub metric_sink: &'static str,
}

/// GET /health - Reports database and metric sink reachability.
///
/// Excluded from request instrumentation by the default prefix list.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
	let database = match sqlx::query("SELECT 1").execute(&state.pool).await {
		Ok(_) => "ok",
		Err(e) => {
			tracing::warn!(error = %e, "database health check failed");
			"unavailable"
		}
	};

	let metric_sink = match state.telemetry.sink_health().await {
		Ok(()) => "ok",
		Err(e) => {
			tracing::warn!(error = %e, "metric sink health check failed");
			"degraded"
		}
	};

	let (status_code, status) = if database == "ok" {
		(StatusCode::OK, "healthy")
	} else {
		(StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
	};

	(
		status_code,
		Json(HealthResponse {
			status,
			database,
			metric_sink,
		}),
	)
}
