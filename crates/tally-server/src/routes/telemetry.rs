// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{extract::State, Json};
use tally_server_telemetry::DispatcherStats;

use crate::AppState;

/// GET /api/telemetry/stats - Dispatcher counters.
pub async fn dispatcher_stats(State(state): State<AppState>) -> Json<DispatcherStats> {
	Json(state.telemetry.stats())
}
