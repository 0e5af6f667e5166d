//! Audit settings
//!
//! Controls where audit records are stored, what caller metadata is attached
//! to them, and how history is displayed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::paths::AuditPaths;
use crate::error::AuditError;

/// Persisted audit-trail settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Record the elapsed time between push and pull on every record
    #[serde(default = "default_true")]
    pub record_time_taken: bool,

    /// Backend table holding audit records
    #[serde(default = "default_audit_table")]
    pub audit_table: String,

    /// Static caller metadata merged into every record's user_info
    #[serde(default)]
    pub user_info: BTreeMap<String, serde_json::Value>,

    /// Default number of records shown by history views
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Timestamp format for history views (strftime format)
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

fn default_schema_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_audit_table() -> String {
    "audit_log".to_string()
}

fn default_history_limit() -> usize {
    50
}

fn default_date_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            record_time_taken: true,
            audit_table: default_audit_table(),
            user_info: BTreeMap::new(),
            history_limit: default_history_limit(),
            date_format: default_date_format(),
        }
    }
}

impl AuditSettings {
    /// Load settings from disk, or use defaults if the file doesn't exist
    pub fn load_or_create(paths: &AuditPaths) -> Result<Self, AuditError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| AuditError::Io(format!("Failed to read settings file: {}", e)))?;

            let settings: AuditSettings = serde_json::from_str(&contents).map_err(|e| {
                AuditError::Configuration(format!("Failed to parse settings file: {}", e))
            })?;

            if settings.audit_table.trim().is_empty() {
                return Err(AuditError::Configuration("audit_table cannot be empty".into()));
            }

            Ok(settings)
        } else {
            // Not saved here; the caller decides when to persist
            Ok(AuditSettings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &AuditPaths) -> Result<(), AuditError> {
        paths.ensure_directories()?;

        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            AuditError::Configuration(format!("Failed to serialize settings: {}", e))
        })?;

        std::fs::write(paths.settings_file(), contents)
            .map_err(|e| AuditError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }
}
