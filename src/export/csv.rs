//! CSV export of audit trails
//!
//! One row per record; diffs and user info are written as compact JSON text.

use std::io::Write;

use crate::audit::AuditRecord;
use crate::error::{AuditError, AuditResult};

const HEADER: &[&str] = &[
    "id",
    "initiator_record_id",
    "timestamp",
    "entity_type",
    "entity_id",
    "action",
    "description",
    "time_taken",
    "request_diff",
    "reactive_diff",
    "is_reverted",
    "revert_record_id",
    "user_info",
];

fn export_error(e: impl ToString) -> AuditError {
    AuditError::Export(e.to_string())
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write records to CSV, one row each
pub fn export_trail_csv<W: Write>(records: &[AuditRecord], writer: W) -> AuditResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(HEADER).map_err(export_error)?;

    for record in records {
        let row = [
            optional(record.id.map(|id| id.get())),
            optional(record.initiator_record_id.map(|id| id.get())),
            record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            record.entity_type.clone(),
            optional(record.entity_id),
            record.action.clone(),
            record.description.clone().unwrap_or_default(),
            optional(record.time_taken.map(|t| format!("{:.6}", t))),
            serde_json::to_string(&record.request_diff)?,
            serde_json::to_string(&record.reactive_diff)?,
            record.is_reverted.to_string(),
            optional(record.revert_record_id.map(|id| id.get())),
            serde_json::to_string(&record.user_info)?,
        ];
        csv.write_record(&row).map_err(export_error)?;
    }

    csv.flush().map_err(export_error)
}
