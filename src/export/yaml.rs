//! YAML export of audit trails

use std::io::Write;

use crate::error::{AuditError, AuditResult};
use crate::export::json::TrailExport;

fn export_error(e: impl ToString) -> AuditError {
    AuditError::Export(e.to_string())
}

/// Write a trail as YAML, preceded by a comment header
pub fn export_trail_yaml<W: Write>(export: &TrailExport, writer: &mut W) -> AuditResult<()> {
    writeln!(writer, "# audit-trail export").map_err(export_error)?;
    writeln!(writer, "# Generated: {}", export.exported_at).map_err(export_error)?;
    writeln!(writer, "# Scope: {}", export.scope).map_err(export_error)?;
    writeln!(writer).map_err(export_error)?;

    serde_yaml::to_writer(writer, export).map_err(export_error)
}

/// Read a YAML export back
pub fn import_trail_yaml(yaml: &str) -> AuditResult<TrailExport> {
    let export: TrailExport = serde_yaml::from_str(yaml).map_err(export_error)?;
    export.validate().map_err(AuditError::Export)?;
    Ok(export)
}
