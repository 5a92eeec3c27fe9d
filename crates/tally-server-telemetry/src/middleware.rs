// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request instrumentation for axum routers.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/api/ventas", get(list_sales))
//!     .layer(axum::middleware::from_fn_with_state(
//!         telemetry.request_telemetry(),
//!         instrument_requests,
//!     ));
//! ```

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::{
	body::{Body, Bytes},
	extract::{ConnectInfo, Request, State},
	http::{header, HeaderMap, StatusCode},
	middleware::Next,
	response::Response,
};
use chrono::Utc;
use futures::FutureExt;
use tally_server_config::TelemetryConfig;
use tally_telemetry_core::{CallerActivity, CallerIdentity, MetricRecord, NetworkUsageRecord};
use tracing::warn;

use crate::dispatcher::MetricsDispatcher;

const UNKNOWN_CLIENT: &str = "unknown";

/// State for [`instrument_requests`].
#[derive(Clone)]
pub struct RequestTelemetry {
	dispatcher: Arc<MetricsDispatcher>,
	excluded_prefixes: Arc<[String]>,
	enabled: bool,
}

impl RequestTelemetry {
	pub fn new(dispatcher: Arc<MetricsDispatcher>, excluded_prefixes: Vec<String>) -> Self {
		Self {
			dispatcher,
			excluded_prefixes: excluded_prefixes.into(),
			enabled: true,
		}
	}

	pub fn from_config(dispatcher: Arc<MetricsDispatcher>, config: &TelemetryConfig) -> Self {
		Self {
			enabled: config.enabled,
			..Self::new(dispatcher, config.excluded_path_prefixes.clone())
		}
	}

	pub fn is_excluded(&self, path: &str) -> bool {
		self
			.excluded_prefixes
			.iter()
			.any(|prefix| path.starts_with(prefix.as_str()))
	}
}

/// What is known about a request before it is handled.
struct RequestSnapshot {
	method: String,
	path: String,
	bytes_received: u64,
	client_address: String,
	user_agent: Option<String>,
	caller: Option<CallerIdentity>,
}

impl RequestSnapshot {
	fn capture(request: &Request) -> Self {
		let headers = request.headers();
		let connect_info = request
			.extensions()
			.get::<ConnectInfo<SocketAddr>>()
			.map(|ConnectInfo(addr)| addr.ip().to_string());

		Self {
			method: request.method().to_string(),
			path: request.uri().path().to_string(),
			bytes_received: declared_content_length(headers),
			client_address: connect_info
				.or_else(|| forwarded_client(headers))
				.unwrap_or_else(|| UNKNOWN_CLIENT.to_string()),
			user_agent: headers
				.get(header::USER_AGENT)
				.and_then(|v| v.to_str().ok())
				.map(|s| s.to_string()),
			caller: request.extensions().get::<CallerIdentity>().cloned(),
		}
	}

	fn into_records(self, status: StatusCode, bytes_sent: u64, started: Instant) -> Vec<MetricRecord> {
		let timestamp = Utc::now();
		let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
		let ip_address = (self.client_address != UNKNOWN_CLIENT).then(|| self.client_address.clone());

		let mut records = Vec::with_capacity(2);
		if let Some(caller) = &self.caller {
			records.push(MetricRecord::CallerActivity(CallerActivity::from_identity(
				caller, ip_address, timestamp,
			)));
		}
		records.push(MetricRecord::NetworkUsage(NetworkUsageRecord {
			path: self.path,
			method: self.method,
			bytes_sent,
			bytes_received: self.bytes_received,
			total_bytes: bytes_sent.saturating_add(self.bytes_received),
			client_address: self.client_address,
			user_agent: self.user_agent,
			status_code: status.as_u16(),
			duration_ms,
			timestamp,
		}));
		records
	}
}

fn declared_content_length(headers: &HeaderMap) -> u64 {
	headers
		.get(header::CONTENT_LENGTH)
		.and_then(|v| v.to_str().ok())
		.and_then(|s| s.trim().parse().ok())
		.unwrap_or(0)
}

fn forwarded_client(headers: &HeaderMap) -> Option<String> {
	headers
		.get("x-forwarded-for")
		.and_then(|v| v.to_str().ok())
		.and_then(|s| s.split(',').next())
		.map(|s| s.trim().to_string())
		.filter(|s| !s.is_empty())
		.or_else(|| {
			headers
				.get("x-real-ip")
				.and_then(|v| v.to_str().ok())
				.map(|s| s.trim().to_string())
				.filter(|s| !s.is_empty())
		})
}

/// Measures every request outside the excluded prefixes and queues a
/// network-usage record, plus a caller-activity touch for authenticated
/// requests.
///
/// The response body is buffered so the exact number of bytes sent can be
/// counted. Handler responses are forwarded unchanged. A handler panic or a
/// body that fails mid-stream is recorded as a 500 and then passed on to the
/// caller as-is.
pub async fn instrument_requests(
	State(telemetry): State<RequestTelemetry>,
	request: Request,
	next: Next,
) -> Response {
	if !telemetry.enabled || telemetry.is_excluded(request.uri().path()) {
		return next.run(request).await;
	}

	let snapshot = RequestSnapshot::capture(&request);
	let started = Instant::now();

	let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
		Ok(response) => response,
		Err(panic) => {
			submit_all(
				&telemetry,
				snapshot.into_records(StatusCode::INTERNAL_SERVER_ERROR, 0, started),
			);
			std::panic::resume_unwind(panic);
		}
	};

	let (parts, body) = response.into_parts();
	let bytes = match axum::body::to_bytes(body, usize::MAX).await {
		Ok(bytes) => bytes,
		Err(e) => {
			warn!(path = %snapshot.path, error = %e, "failed to buffer response body");
			submit_all(
				&telemetry,
				snapshot.into_records(StatusCode::INTERNAL_SERVER_ERROR, 0, started),
			);
			// Hand the body error to the client as the handler produced it.
			let failed = futures::stream::once(async move { Err::<Bytes, _>(e) });
			return Response::from_parts(parts, Body::from_stream(failed));
		}
	};

	let bytes_sent = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
	submit_all(&telemetry, snapshot.into_records(parts.status, bytes_sent, started));

	Response::from_parts(parts, Body::from(bytes))
}

fn submit_all(telemetry: &RequestTelemetry, records: Vec<MetricRecord>) {
	for record in records {
		telemetry.dispatcher.submit(record);
	}
}
