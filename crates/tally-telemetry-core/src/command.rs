// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Best-effort classification of database command text.
//!
//! This is a textual heuristic, not a SQL parser. It reads the leading verb
//! and looks for the first `FROM`, `INTO` or `UPDATE` keyword to guess the
//! table a command touches. Joins, subqueries and multi-statement batches can
//! produce the wrong table; [`ClassificationConfidence`] tells consumers when
//! the guess is shaky.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::records::UnknownVariant;

/// Upper bound on stored command text, in characters.
pub const MAX_COMMAND_TEXT_CHARS: usize = 500;

const TABLE_KEYWORDS: [&str; 3] = ["FROM", "INTO", "UPDATE"];
const NAME_TERMINATORS: [char; 4] = ['(', ')', ';', ','];
const IDENTIFIER_QUOTES: [char; 4] = ['[', ']', '"', '`'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
	#[serde(rename = "SELECT")]
	Select,
	#[serde(rename = "INSERT")]
	Insert,
	#[serde(rename = "UPDATE")]
	Update,
	#[serde(rename = "DELETE")]
	Delete,
	StoredProcedure,
	Unknown,
}

impl CommandKind {
	/// The keyword that names the target table for this kind of statement.
	fn table_keyword(self) -> Option<&'static str> {
		match self {
			CommandKind::Select | CommandKind::Delete => Some("FROM"),
			CommandKind::Insert => Some("INTO"),
			CommandKind::Update => Some("UPDATE"),
			CommandKind::StoredProcedure | CommandKind::Unknown => None,
		}
	}
}

impl fmt::Display for CommandKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			CommandKind::Select => "SELECT",
			CommandKind::Insert => "INSERT",
			CommandKind::Update => "UPDATE",
			CommandKind::Delete => "DELETE",
			CommandKind::StoredProcedure => "StoredProcedure",
			CommandKind::Unknown => "Unknown",
		};
		write!(f, "{s}")
	}
}

impl FromStr for CommandKind {
	type Err = UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"SELECT" => Ok(CommandKind::Select),
			"INSERT" => Ok(CommandKind::Insert),
			"UPDATE" => Ok(CommandKind::Update),
			"DELETE" => Ok(CommandKind::Delete),
			"StoredProcedure" => Ok(CommandKind::StoredProcedure),
			"Unknown" => Ok(CommandKind::Unknown),
			other => Err(UnknownVariant::new("command kind", other)),
		}
	}
}

/// How much a [`CommandClassification`] can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationConfidence {
	/// Known verb, and the table came from the keyword that belongs to it in a
	/// single simple statement.
	Confident,
	/// Known verb, but the table is missing, came from another keyword, or the
	/// text contains joins, subqueries or several statements.
	Heuristic,
	/// The verb was not recognised.
	Unclassified,
}

impl fmt::Display for ClassificationConfidence {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ClassificationConfidence::Confident => "confident",
			ClassificationConfidence::Heuristic => "heuristic",
			ClassificationConfidence::Unclassified => "unclassified",
		};
		write!(f, "{s}")
	}
}

impl FromStr for ClassificationConfidence {
	type Err = UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"confident" => Ok(ClassificationConfidence::Confident),
			"heuristic" => Ok(ClassificationConfidence::Heuristic),
			"unclassified" => Ok(ClassificationConfidence::Unclassified),
			other => Err(UnknownVariant::new("classification confidence", other)),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandClassification {
	pub kind: CommandKind,
	pub table_name: Option<String>,
	pub confidence: ClassificationConfidence,
}

/// Classifies command text by its leading verb and guesses the table name.
///
/// Never fails: unrecognised text yields [`CommandKind::Unknown`] and text
/// without a `FROM`/`INTO`/`UPDATE` keyword yields no table name.
pub fn classify_command(text: &str) -> CommandClassification {
	let trimmed = text.trim();
	// ASCII upper-casing keeps byte offsets aligned with `trimmed`.
	let upper = trimmed.to_ascii_uppercase();

	let kind = kind_from_prefix(&upper);
	let extracted = extract_table_name(trimmed, &upper);

	let confidence = match kind {
		CommandKind::Unknown => ClassificationConfidence::Unclassified,
		_ => {
			let keyword_matches = matches!(
				(&extracted, kind.table_keyword()),
				(Some((found, _)), Some(expected)) if *found == expected
			);
			if keyword_matches && !looks_compound(&upper) {
				ClassificationConfidence::Confident
			} else {
				ClassificationConfidence::Heuristic
			}
		}
	};

	CommandClassification {
		kind,
		table_name: extracted.map(|(_, name)| name),
		confidence,
	}
}

/// Truncates `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_command_text(text: &str, max_chars: usize) -> String {
	match text.char_indices().nth(max_chars) {
		Some((byte_idx, _)) => text[..byte_idx].to_string(),
		None => text.to_string(),
	}
}

fn kind_from_prefix(upper: &str) -> CommandKind {
	if upper.starts_with("SELECT") {
		CommandKind::Select
	} else if upper.starts_with("INSERT") {
		CommandKind::Insert
	} else if upper.starts_with("UPDATE") {
		CommandKind::Update
	} else if upper.starts_with("DELETE") {
		CommandKind::Delete
	} else if upper.starts_with("EXECUTE") || upper.starts_with("EXEC") {
		CommandKind::StoredProcedure
	} else {
		CommandKind::Unknown
	}
}

/// Returns the keyword that matched and the name that followed it.
fn extract_table_name(original: &str, upper: &str) -> Option<(&'static str, String)> {
	let (keyword, pos) = TABLE_KEYWORDS
		.iter()
		.find_map(|kw| find_keyword(upper, kw).map(|pos| (*kw, pos)))?;

	let rest = original[pos + keyword.len()..].trim_start();
	let end = rest
		.find(|c: char| c.is_whitespace() || NAME_TERMINATORS.contains(&c))
		.unwrap_or(rest.len());

	let name: String = rest[..end]
		.chars()
		.filter(|c| !IDENTIFIER_QUOTES.contains(c))
		.collect();

	if name.is_empty() {
		None
	} else {
		Some((keyword, name))
	}
}

/// Finds `keyword` as a whole word in `upper`.
fn find_keyword(upper: &str, keyword: &str) -> Option<usize> {
	let bytes = upper.as_bytes();
	upper.match_indices(keyword).map(|(pos, _)| pos).find(|&pos| {
		let before_ok = pos == 0 || !is_identifier_byte(bytes[pos - 1]);
		let after = pos + keyword.len();
		let after_ok = after >= bytes.len() || !is_identifier_byte(bytes[after]);
		before_ok && after_ok
	})
}

fn is_identifier_byte(b: u8) -> bool {
	b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn looks_compound(upper: &str) -> bool {
	let multi_statement = upper.trim_end_matches(|c: char| c == ';' || c.is_whitespace()).contains(';');
	let subquery = upper.matches("SELECT").count() > 1;
	multi_statement || subquery || find_keyword(upper, "JOIN").is_some()
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn select_with_where_extracts_table() {
		let c = classify_command("SELECT * FROM Ventas WHERE Id=1");
		assert_eq!(c.kind, CommandKind::Select);
		assert_eq!(c.table_name.as_deref(), Some("Ventas"));
		assert_eq!(c.confidence, ClassificationConfidence::Confident);
	}

	#[test]
	fn leading_whitespace_and_lowercase_are_tolerated() {
		let c = classify_command("  \n select id from productos;");
		assert_eq!(c.kind, CommandKind::Select);
		assert_eq!(c.table_name.as_deref(), Some("productos"));
	}

	#[test]
	fn insert_update_delete_use_their_keyword() {
		let insert = classify_command("INSERT INTO Compras (Id, Total) VALUES (1, 2)");
		assert_eq!(insert.kind, CommandKind::Insert);
		assert_eq!(insert.table_name.as_deref(), Some("Compras"));
		assert_eq!(insert.confidence, ClassificationConfidence::Confident);

		let update = classify_command("UPDATE Inventario SET Stock = 3 WHERE Id = 9");
		assert_eq!(update.kind, CommandKind::Update);
		assert_eq!(update.table_name.as_deref(), Some("Inventario"));

		let delete = classify_command("DELETE FROM Clientes WHERE Id = 4");
		assert_eq!(delete.kind, CommandKind::Delete);
		assert_eq!(delete.table_name.as_deref(), Some("Clientes"));
	}

	#[test]
	fn exec_and_execute_are_stored_procedures() {
		for text in ["EXEC sp_RegistrarVenta @Id = 1", "execute dbo.sp_Cierre"] {
			let c = classify_command(text);
			assert_eq!(c.kind, CommandKind::StoredProcedure);
			assert_eq!(c.table_name, None);
			assert_eq!(c.confidence, ClassificationConfidence::Heuristic);
		}
	}

	#[test]
	fn text_without_keywords_has_no_table() {
		let c = classify_command("PRAGMA journal_mode = WAL");
		assert_eq!(c.kind, CommandKind::Unknown);
		assert_eq!(c.table_name, None);
		assert_eq!(c.confidence, ClassificationConfidence::Unclassified);
	}

	#[test]
	fn empty_text_is_unknown() {
		let c = classify_command("");
		assert_eq!(c.kind, CommandKind::Unknown);
		assert_eq!(c.table_name, None);
	}

	#[test]
	fn quoted_identifiers_are_unwrapped() {
		let c = classify_command("SELECT * FROM [dbo].[Ventas] WHERE Id = 1");
		assert_eq!(c.table_name.as_deref(), Some("dbo.Ventas"));

		let c = classify_command("SELECT * FROM \"ventas\"");
		assert_eq!(c.table_name.as_deref(), Some("ventas"));
	}

	#[test]
	fn keyword_inside_identifier_is_ignored() {
		let c = classify_command("SELECT fromage FROM quesos");
		assert_eq!(c.table_name.as_deref(), Some("quesos"));
	}

	#[test]
	fn joins_lower_confidence_but_keep_first_table() {
		let c = classify_command("SELECT * FROM Ventas v JOIN Clientes c ON c.Id = v.ClienteId");
		assert_eq!(c.table_name.as_deref(), Some("Ventas"));
		assert_eq!(c.confidence, ClassificationConfidence::Heuristic);
	}

	#[test]
	fn insert_select_reports_from_table() {
		// FROM is searched before INTO, so the source table wins.
		let c = classify_command("INSERT INTO Historico SELECT * FROM Ventas");
		assert_eq!(c.kind, CommandKind::Insert);
		assert_eq!(c.table_name.as_deref(), Some("Ventas"));
		assert_eq!(c.confidence, ClassificationConfidence::Heuristic);
	}

	#[test]
	fn multi_statement_batch_is_heuristic() {
		let c = classify_command("DELETE FROM A WHERE Id = 1; DELETE FROM B WHERE Id = 1;");
		assert_eq!(c.table_name.as_deref(), Some("A"));
		assert_eq!(c.confidence, ClassificationConfidence::Heuristic);
	}

	#[test]
	fn trailing_semicolon_alone_is_not_a_batch() {
		let c = classify_command("SELECT 1 FROM dual;");
		assert_eq!(c.confidence, ClassificationConfidence::Confident);
	}

	#[test]
	fn keyword_at_end_of_text_yields_no_table() {
		let c = classify_command("SELECT * FROM");
		assert_eq!(c.kind, CommandKind::Select);
		assert_eq!(c.table_name, None);
		assert_eq!(c.confidence, ClassificationConfidence::Heuristic);
	}

	#[test]
	fn kind_display_round_trips_through_from_str() {
		for kind in [
			CommandKind::Select,
			CommandKind::Insert,
			CommandKind::Update,
			CommandKind::Delete,
			CommandKind::StoredProcedure,
			CommandKind::Unknown,
		] {
			assert_eq!(kind.to_string().parse::<CommandKind>().unwrap(), kind);
		}
		assert!("MERGE".parse::<CommandKind>().is_err());
	}

	#[test]
	fn truncate_respects_char_boundaries() {
		assert_eq!(truncate_command_text("añoñ", 2), "añ");
		assert_eq!(truncate_command_text("short", 500), "short");
		let long = "x".repeat(MAX_COMMAND_TEXT_CHARS + 20);
		assert_eq!(
			truncate_command_text(&long, MAX_COMMAND_TEXT_CHARS).len(),
			MAX_COMMAND_TEXT_CHARS
		);
	}

	proptest! {
		#[test]
		fn classify_never_panics(text in ".*") {
			let c = classify_command(&text);
			if c.kind == CommandKind::Unknown {
				prop_assert_eq!(c.confidence, ClassificationConfidence::Unclassified);
			}
		}

		#[test]
		fn truncation_is_bounded_prefix(text in ".*", max in 0usize..64) {
			let out = truncate_command_text(&text, max);
			prop_assert!(out.chars().count() <= max);
			prop_assert!(text.starts_with(&out));
		}

		#[test]
		fn extracted_table_never_contains_terminators(table in "[A-Za-z_][A-Za-z0-9_]{0,16}") {
			let text = format!("SELECT a, b FROM {table} WHERE a = 1");
			let c = classify_command(&text);
			prop_assert_eq!(c.table_name, Some(table));
		}
	}
}
