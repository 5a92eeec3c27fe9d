// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core telemetry types for the Tally backend.
//!
//! This crate holds the record shapes written to the metric store and the
//! best-effort classifier used for slow database commands. It has no I/O;
//! persistence lives in `tally-server-telemetry`.

pub mod caller;
pub mod command;
pub mod kind;
pub mod records;

pub use caller::{CallerActivity, CallerIdentity};
pub use command::{
	classify_command, truncate_command_text, ClassificationConfidence, CommandClassification,
	CommandKind, MAX_COMMAND_TEXT_CHARS,
};
pub use kind::MetricKind;
pub use records::{
	ActiveCallerRecord, FailedLoginRecord, MetricRecord, NetworkUsageRecord, SlowCommandRecord,
	TransactionKind, TransactionRecord, TransactionRecordBuilder, TransactionStatus,
	UnknownVariant,
};
