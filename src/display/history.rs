//! History feed formatting
//!
//! Renders an audit trail for the terminal: one line per record, followed by
//! its field changes, with records nested under the record that initiated
//! them.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value as Json;

use crate::audit::{AuditRecord, Diff};
use crate::models::{render_raw, AuditRecordId, Rendered};

const INDENT: &str = "  ";

/// Format a list of records as a history feed
///
/// Records keep the given order; a record whose initiator is also in the list
/// is printed under it instead.
pub fn format_history(records: &[AuditRecord], date_format: &str) -> String {
    if records.is_empty() {
        return "No history found.\n".to_string();
    }

    let present: BTreeSet<AuditRecordId> = records.iter().filter_map(|r| r.id).collect();
    let mut children: BTreeMap<AuditRecordId, Vec<&AuditRecord>> = BTreeMap::new();
    let mut roots = Vec::new();

    for record in records {
        match record.initiator_record_id {
            Some(parent) if present.contains(&parent) => {
                children.entry(parent).or_default().push(record)
            }
            _ => roots.push(record),
        }
    }

    let mut output = String::new();
    for record in roots {
        write_record(&mut output, record, &children, date_format, 0);
    }
    output
}

fn write_record(
    output: &mut String,
    record: &AuditRecord,
    children: &BTreeMap<AuditRecordId, Vec<&AuditRecord>>,
    date_format: &str,
    depth: usize,
) {
    let indent = INDENT.repeat(depth);
    output.push_str(&indent);
    output.push_str(&format_record_line(record, date_format));
    output.push('\n');

    for line in format_changes(&record.request_diff, "") {
        output.push_str(&format!("{}{}{}\n", indent, INDENT, line));
    }
    for line in format_changes(&record.reactive_diff, " (reactive)") {
        output.push_str(&format!("{}{}{}\n", indent, INDENT, line));
    }

    if let Some(nested) = record.id.and_then(|id| children.get(&id)) {
        for child in nested {
            write_record(output, child, children, date_format, depth + 1);
        }
    }
}

/// `[ts] #id action: description` with revert markers
pub fn format_record_line(record: &AuditRecord, date_format: &str) -> String {
    let id = record
        .id
        .map(|id| format!("#{}", id.get()))
        .unwrap_or_else(|| "#?".to_string());

    let mut line = format!(
        "[{}] {} {}",
        record.timestamp.format(date_format),
        id,
        record.action
    );

    if let Some(description) = record.description.as_deref().filter(|d| !d.is_empty()) {
        line.push_str(": ");
        line.push_str(description);
    }
    if let Some(reverted) = record.revert_record_id {
        line.push_str(&format!(" (undo of #{})", reverted.get()));
    }
    if record.is_reverted {
        line.push_str(" (reverted)");
    }

    line
}

/// `field: old -> new` for every change in a diff
pub fn format_changes(diff: &Diff, suffix: &str) -> Vec<String> {
    diff.iter()
        .map(|(field, change)| {
            format!(
                "{}: {} -> {}{}",
                field,
                display_value(&change.old),
                display_value(&change.new),
                suffix
            )
        })
        .collect()
}

fn display_value(stored: &Json) -> String {
    match (stored, render_raw(stored)) {
        (Json::Null, _) => "(empty)".to_string(),
        (_, Rendered::Text(text)) => text,
        (other, Rendered::Unrenderable) => other.to_string(),
    }
}

/// Full details of one record
pub fn format_record_details(record: &AuditRecord, date_format: &str) -> String {
    let mut output = String::new();

    let id = record.id.map(|id| id.get().to_string()).unwrap_or_default();
    output.push_str(&format!("Record:      #{}\n", id));
    output.push_str(&format!("Entity:      {}", record.entity_type));
    if let Some(entity_id) = record.entity_id {
        output.push_str(&format!(" #{}", entity_id));
    }
    output.push('\n');
    output.push_str(&format!("Action:      {}\n", record.action));
    output.push_str(&format!(
        "Time:        {}\n",
        record.timestamp.format(date_format)
    ));

    if let Some(taken) = record.time_taken {
        output.push_str(&format!("Took:        {:.3}s\n", taken));
    }
    if let Some(description) = &record.description {
        output.push_str(&format!("Description: {}\n", description));
    }
    if let Some(initiator) = record.initiator_record_id {
        output.push_str(&format!("Initiator:   #{}\n", initiator.get()));
    }
    if let Some(reverted) = record.revert_record_id {
        output.push_str(&format!("Undo of:     #{}\n", reverted.get()));
    }
    if record.is_reverted {
        output.push_str("Status:      reverted\n");
    }

    if !record.request_diff.is_empty() {
        output.push_str("\nRequested changes:\n");
        for line in format_changes(&record.request_diff, "") {
            output.push_str(&format!("{}{}\n", INDENT, line));
        }
    }
    if !record.reactive_diff.is_empty() {
        output.push_str("\nResulting changes:\n");
        for line in format_changes(&record.reactive_diff, "") {
            output.push_str(&format!("{}{}\n", INDENT, line));
        }
    }
    if !record.user_info.is_empty() {
        output.push_str("\nUser info:\n");
        for (key, value) in &record.user_info {
            output.push_str(&format!("{}{}: {}\n", INDENT, key, display_value(value)));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Change;
    use crate::models::EntityId;
    use serde_json::json;

    const FORMAT: &str = "%Y-%m-%d";

    fn record(id: u64, action: &str) -> AuditRecord {
        let mut record = AuditRecord::new("invoice", action);
        record.id = Some(AuditRecordId::new(id));
        record.entity_id = Some(EntityId::new(1));
        record
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(format_history(&[], FORMAT), "No history found.\n");
    }

    #[test]
    fn test_record_line_markers() {
        let mut update = record(2, "update");
        update.description = Some("update Spain: name=Espana".into());
        update.is_reverted = true;
        let line = format_record_line(&update, FORMAT);
        assert!(line.ends_with("#2 update: update Spain: name=Espana (reverted)"));

        let mut undo = record(3, "undo update");
        undo.revert_record_id = Some(AuditRecordId::new(2));
        assert!(format_record_line(&undo, FORMAT).ends_with("#3 undo update (undo of #2)"));
    }

    #[test]
    fn test_changes_render_old_and_new() {
        let mut diff = Diff::new();
        diff.insert("name".into(), Change::new("Spain", "Espana"));
        diff.insert("code".into(), Change::new(json!(null), 34));
        diff.insert("tags".into(), Change::new(json!(null), json!(["a"])));

        assert_eq!(
            format_changes(&diff, ""),
            vec![
                "code: (empty) -> 34".to_string(),
                "name: Spain -> Espana".to_string(),
                "tags: (empty) -> [\"a\"]".to_string(),
            ]
        );
    }

    #[test]
    fn test_nested_records_are_indented() {
        let parent = record(1, "update");
        let mut child = record(2, "update");
        child.initiator_record_id = Some(AuditRecordId::new(1));
        child
            .request_diff
            .insert("total".into(), Change::new(10, 20));
        let other = record(3, "comment");

        let output = format_history(&[parent, child, other], FORMAT);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("#1 update"));
        assert!(lines[1].starts_with("  [") && lines[1].contains("#2 update"));
        assert_eq!(lines[2], "    total: 10 -> 20");
        assert!(lines[3].starts_with('[') && lines[3].contains("#3 comment"));
    }

    #[test]
    fn test_orphaned_child_is_a_root() {
        let mut child = record(5, "update");
        child.initiator_record_id = Some(AuditRecordId::new(4));
        let output = format_history(&[child], FORMAT);
        assert!(output.starts_with('['));
    }
}
