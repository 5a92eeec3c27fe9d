// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Metric record shapes.
//!
//! Every record except [`ActiveCallerRecord`] is written once and never
//! mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::caller::CallerActivity;
use crate::command::{ClassificationConfidence, CommandKind};
use crate::kind::MetricKind;

/// Returned when a stored enum value does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what}: '{value}'")]
pub struct UnknownVariant {
	pub what: &'static str,
	pub value: String,
}

impl UnknownVariant {
	pub fn new(what: &'static str, value: &str) -> Self {
		Self {
			what,
			value: value.to_string(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkUsageRecord {
	pub path: String,
	pub method: String,
	pub bytes_sent: u64,
	/// Declared `Content-Length` of the request, not bytes read off the wire.
	pub bytes_received: u64,
	pub total_bytes: u64,
	pub client_address: String,
	pub user_agent: Option<String>,
	pub status_code: u16,
	pub duration_ms: u64,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedLoginRecord {
	pub username: Option<String>,
	pub ip_address: String,
	pub user_agent: Option<String>,
	pub failure_reason: String,
	pub is_suspicious: bool,
	pub attempt_count: u32,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlowCommandRecord {
	pub command_kind: CommandKind,
	pub confidence: ClassificationConfidence,
	pub table_name: Option<String>,
	/// Command text, truncated to [`crate::MAX_COMMAND_TEXT_CHARS`].
	pub command_text: String,
	pub duration_ms: u64,
	pub threshold_ms: u64,
	pub rows_affected: Option<u64>,
	pub endpoint: Option<String>,
	pub caller_id: Option<String>,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCallerRecord {
	pub caller_id: String,
	pub display_name: String,
	pub role: Option<String>,
	pub session_start: DateTime<Utc>,
	pub last_activity: DateTime<Utc>,
	pub ip_address: Option<String>,
	pub request_count: u64,
	pub is_active: bool,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
	Sale,
	Purchase,
	Return,
	InventoryAdjustment,
}

impl fmt::Display for TransactionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			TransactionKind::Sale => "sale",
			TransactionKind::Purchase => "purchase",
			TransactionKind::Return => "return",
			TransactionKind::InventoryAdjustment => "inventory_adjustment",
		};
		write!(f, "{s}")
	}
}

impl FromStr for TransactionKind {
	type Err = UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"sale" => Ok(TransactionKind::Sale),
			"purchase" => Ok(TransactionKind::Purchase),
			"return" => Ok(TransactionKind::Return),
			"inventory_adjustment" => Ok(TransactionKind::InventoryAdjustment),
			other => Err(UnknownVariant::new("transaction kind", other)),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
	#[default]
	Completed,
	Pending,
	Failed,
	Cancelled,
}

impl fmt::Display for TransactionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			TransactionStatus::Completed => "completed",
			TransactionStatus::Pending => "pending",
			TransactionStatus::Failed => "failed",
			TransactionStatus::Cancelled => "cancelled",
		};
		write!(f, "{s}")
	}
}

impl FromStr for TransactionStatus {
	type Err = UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"completed" => Ok(TransactionStatus::Completed),
			"pending" => Ok(TransactionStatus::Pending),
			"failed" => Ok(TransactionStatus::Failed),
			"cancelled" => Ok(TransactionStatus::Cancelled),
			other => Err(UnknownVariant::new("transaction status", other)),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
	pub kind: TransactionKind,
	pub reference_id: String,
	/// Amount in minor currency units (cents).
	pub amount: i64,
	pub caller_id: Option<String>,
	pub counterparty_id: Option<String>,
	pub status: TransactionStatus,
	pub item_count: u32,
	pub payment_method: Option<String>,
	pub duration_ms: Option<u64>,
	pub ip_address: Option<String>,
	pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
	pub fn builder(
		kind: TransactionKind,
		reference_id: impl Into<String>,
		amount: i64,
	) -> TransactionRecordBuilder {
		TransactionRecordBuilder::new(kind, reference_id, amount)
	}
}

pub struct TransactionRecordBuilder {
	kind: TransactionKind,
	reference_id: String,
	amount: i64,
	caller_id: Option<String>,
	counterparty_id: Option<String>,
	status: TransactionStatus,
	item_count: u32,
	payment_method: Option<String>,
	duration_ms: Option<u64>,
	ip_address: Option<String>,
}

impl TransactionRecordBuilder {
	pub fn new(kind: TransactionKind, reference_id: impl Into<String>, amount: i64) -> Self {
		Self {
			kind,
			reference_id: reference_id.into(),
			amount,
			caller_id: None,
			counterparty_id: None,
			status: TransactionStatus::default(),
			item_count: 0,
			payment_method: None,
			duration_ms: None,
			ip_address: None,
		}
	}

	/// Set the caller who completed the transaction.
	pub fn caller(mut self, caller_id: impl Into<String>) -> Self {
		self.caller_id = Some(caller_id.into());
		self
	}

	/// Set the customer or supplier on the other side.
	pub fn counterparty(mut self, counterparty_id: impl Into<String>) -> Self {
		self.counterparty_id = Some(counterparty_id.into());
		self
	}

	pub fn status(mut self, status: TransactionStatus) -> Self {
		self.status = status;
		self
	}

	pub fn item_count(mut self, item_count: u32) -> Self {
		self.item_count = item_count;
		self
	}

	pub fn payment_method(mut self, payment_method: impl Into<String>) -> Self {
		self.payment_method = Some(payment_method.into());
		self
	}

	pub fn duration_ms(mut self, duration_ms: u64) -> Self {
		self.duration_ms = Some(duration_ms);
		self
	}

	pub fn ip_address(mut self, ip_address: impl Into<String>) -> Self {
		self.ip_address = Some(ip_address.into());
		self
	}

	pub fn build(self) -> TransactionRecord {
		TransactionRecord {
			kind: self.kind,
			reference_id: self.reference_id,
			amount: self.amount,
			caller_id: self.caller_id,
			counterparty_id: self.counterparty_id,
			status: self.status,
			item_count: self.item_count,
			payment_method: self.payment_method,
			duration_ms: self.duration_ms,
			ip_address: self.ip_address,
			timestamp: Utc::now(),
		}
	}
}

/// A snapshot handed from an instrumentation point to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum MetricRecord {
	NetworkUsage(NetworkUsageRecord),
	FailedLogin(FailedLoginRecord),
	SlowCommand(SlowCommandRecord),
	CallerActivity(CallerActivity),
	Transaction(TransactionRecord),
}

impl MetricRecord {
	pub fn kind(&self) -> MetricKind {
		match self {
			MetricRecord::NetworkUsage(_) => MetricKind::NetworkUsage,
			MetricRecord::FailedLogin(_) => MetricKind::FailedLogin,
			MetricRecord::SlowCommand(_) => MetricKind::SlowCommand,
			MetricRecord::CallerActivity(_) => MetricKind::ActiveCaller,
			MetricRecord::Transaction(_) => MetricKind::Transaction,
		}
	}
}
