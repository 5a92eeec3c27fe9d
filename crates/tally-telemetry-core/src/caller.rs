// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated principal behind a request.
///
/// The upstream auth layer inserts this as a request extension. Requests
/// without it are anonymous and skip active-caller tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
	pub caller_id: String,
	pub display_name: String,
	pub role: Option<String>,
}

impl CallerIdentity {
	pub fn new(caller_id: impl Into<String>, display_name: impl Into<String>) -> Self {
		Self {
			caller_id: caller_id.into(),
			display_name: display_name.into(),
			role: None,
		}
	}

	pub fn with_role(mut self, role: impl Into<String>) -> Self {
		self.role = Some(role.into());
		self
	}
}

/// One observed request from a known caller, applied to the active-caller
/// store as an upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallerActivity {
	pub caller_id: String,
	pub display_name: String,
	pub role: Option<String>,
	pub ip_address: Option<String>,
	pub observed_at: DateTime<Utc>,
}

impl CallerActivity {
	pub fn from_identity(
		identity: &CallerIdentity,
		ip_address: Option<String>,
		observed_at: DateTime<Utc>,
	) -> Self {
		Self {
			caller_id: identity.caller_id.clone(),
			display_name: identity.display_name.clone(),
			role: identity.role.clone(),
			ip_address,
			observed_at,
		}
	}
}
