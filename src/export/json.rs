//! JSON export of audit trails
//!
//! Wraps the records in a versioned envelope so an export can be checked
//! before it is read back.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::AuditRecord;
use crate::error::{AuditError, AuditResult};

/// Current export schema version
pub const EXPORT_SCHEMA_VERSION: &str = "1.0.0";

/// Exported trail with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailExport {
    /// Schema version for compatibility checking
    pub schema_version: String,

    pub exported_at: DateTime<Utc>,

    /// Version of the tool that wrote the export
    pub app_version: String,

    /// Scope of the export, e.g. `country #1` or `all`
    pub scope: String,

    pub record_count: usize,

    /// Records, oldest first
    pub records: Vec<AuditRecord>,
}

impl TrailExport {
    pub fn new(scope: impl Into<String>, records: Vec<AuditRecord>) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION.to_string(),
            exported_at: Utc::now(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            scope: scope.into(),
            record_count: records.len(),
            records,
        }
    }

    /// Check an export read back from disk
    pub fn validate(&self) -> Result<(), String> {
        let major = |v: &str| v.split('.').next().map(str::to_string);
        if major(&self.schema_version) != major(EXPORT_SCHEMA_VERSION) {
            return Err(format!(
                "Unsupported export schema version {} (expected {})",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }
        if self.record_count != self.records.len() {
            return Err(format!(
                "Export declares {} records but contains {}",
                self.record_count,
                self.records.len()
            ));
        }
        if self.records.iter().any(|r| r.id.is_none()) {
            return Err("Export contains a record without an id".to_string());
        }
        Ok(())
    }
}

/// Write a trail as JSON
pub fn export_trail_json<W: Write>(export: &TrailExport, writer: &mut W, pretty: bool) -> AuditResult<()> {
    let result = if pretty {
        serde_json::to_writer_pretty(writer, export)
    } else {
        serde_json::to_writer(writer, export)
    };
    result.map_err(|e| AuditError::Export(e.to_string()))
}

/// Read a JSON export back
pub fn import_trail_json(json: &str) -> AuditResult<TrailExport> {
    let export: TrailExport =
        serde_json::from_str(json).map_err(|e| AuditError::Export(e.to_string()))?;
    export.validate().map_err(AuditError::Export)?;
    Ok(export)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Change;
    use crate::models::{AuditRecordId, EntityId};

    fn records() -> Vec<AuditRecord> {
        let mut create = AuditRecord::new("country", "create");
        create.id = Some(AuditRecordId::new(1));
        create.entity_id = Some(EntityId::new(1));
        create
            .reactive_diff
            .insert("name".into(), Change::new(serde_json::Value::Null, "Spain"));

        let mut update = AuditRecord::new("country", "update");
        update.id = Some(AuditRecordId::new(2));
        update.entity_id = Some(EntityId::new(1));
        update
            .request_diff
            .insert("name".into(), Change::new("Spain", "Espana"));
        update.description = Some("update Spain: name=Espana".into());

        vec![create, update]
    }

    #[test]
    fn test_json_export_contains_diffs() {
        let export = TrailExport::new("country #1", records());
        let mut output = Vec::new();
        export_trail_json(&export, &mut output, true).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("\"schema_version\": \"1.0.0\""));
        assert!(text.contains("\"record_count\": 2"));
        assert!(text.contains("update Spain: name=Espana"));

        let imported = import_trail_json(&text).unwrap();
        assert_eq!(imported.records, export.records);
    }

    #[test]
    fn test_import_rejects_count_mismatch() {
        let mut export = TrailExport::new("all", records());
        export.record_count = 5;
        let text = serde_json::to_string(&export).unwrap();

        let err = import_trail_json(&text).unwrap_err();
        assert!(matches!(err, AuditError::Export(ref msg) if msg.contains("declares 5")));
    }

    #[test]
    fn test_import_rejects_other_major_version() {
        let mut export = TrailExport::new("all", records());
        export.schema_version = "2.0.0".into();
        assert!(export.validate().is_err());
    }
}
