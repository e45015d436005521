//! Formatted output helpers for CLI commands.
//!
//! Provides parameter tables, id lists, and the plan banner.

use std::collections::BTreeSet;

use stackwire_common::types::LogicalId;
use stackwire_store::PublishedParameter;

/// Longest value shown in a table cell before truncation.
const MAX_VALUE_WIDTH: usize = 48;

/// A horizontal rule of `width` box-drawing characters.
#[must_use]
pub fn rule(width: usize) -> String {
    "\u{2550}".repeat(width)
}

/// Comma-separated logical ids.
#[must_use]
pub fn join_ids(ids: &BTreeSet<LogicalId>) -> String {
    ids.iter()
        .map(LogicalId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// One-line summary of a stored parameter.
#[must_use]
pub fn format_parameter(record: &PublishedParameter) -> String {
    format!(
        "{} = {} (stack {}, {})",
        record.key,
        truncate(&record.value, MAX_VALUE_WIDTH),
        record.producing_stack,
        record.written_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Tab-separated table of parameters with a header row.
#[must_use]
pub fn parameter_table(records: &[PublishedParameter]) -> String {
    let mut lines = vec![String::from("KEY\tVALUE\tSTACK\tWRITTEN")];
    lines.extend(records.iter().map(|r| {
        format!(
            "{}\t{}\t{}\t{}",
            r.key,
            truncate(&r.value, MAX_VALUE_WIDTH),
            r.producing_stack,
            r.written_at.to_rfc3339()
        )
    }));
    lines.join("\n")
}

/// Shortens `value` to at most `width` characters, marking the cut.
#[must_use]
pub fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let kept: String = value.chars().take(width.saturating_sub(1)).collect();
    format!("{kept}\u{2026}")
}
