//! Audit record data structures
//!
//! One [`AuditRecord`] is persisted per tracked action. Records reference
//! each other through `initiator_record_id` (nesting) and
//! `revert_record_id` (undo linkage).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::error::{AuditError, AuditResult};
use crate::models::{AuditRecordId, EntityId};
use crate::storage::Row;

/// One field change in canonical stored form, serialized as `[old, new]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Json, Json)", into = "(Json, Json)")]
pub struct Change {
    pub old: Json,
    pub new: Json,
}

impl Change {
    pub fn new(old: impl Into<Json>, new: impl Into<Json>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

impl From<(Json, Json)> for Change {
    fn from((old, new): (Json, Json)) -> Self {
        Self { old, new }
    }
}

impl From<Change> for (Json, Json) {
    fn from(change: Change) -> Self {
        (change.old, change.new)
    }
}

/// Field name to change
pub type Diff = BTreeMap<String, Change>;

/// Record fields that custom overrides and `custom_log` extras may set
pub const OVERRIDABLE_FIELDS: &[&str] = &[
    "action",
    "description",
    "request_diff",
    "reactive_diff",
    "user_info",
    "revert_record_id",
    "is_reverted",
];

/// A single tracked action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Assigned when first persisted
    #[serde(default)]
    pub id: Option<AuditRecordId>,

    /// The still-open record whose operation caused this one
    #[serde(default)]
    pub initiator_record_id: Option<AuditRecordId>,

    /// Type id of the host entity
    pub entity_type: String,

    /// Host entity id; unknown until a create has been written
    #[serde(default)]
    pub entity_id: Option<EntityId>,

    /// create / update / delete / custom action name
    pub action: String,

    /// Set at push time
    pub timestamp: DateTime<Utc>,

    /// Seconds between push and pull
    #[serde(default)]
    pub time_taken: Option<f64>,

    #[serde(default)]
    pub description: Option<String>,

    /// Changes requested by the caller
    #[serde(default)]
    pub request_diff: Diff,

    /// Residual changes discovered after persistence
    #[serde(default)]
    pub reactive_diff: Diff,

    /// Set once an undo targeting this record succeeds
    #[serde(default)]
    pub is_reverted: bool,

    /// On a record produced by an undo: the record that was reverted
    #[serde(default)]
    pub revert_record_id: Option<AuditRecordId>,

    /// Caller/environment metadata
    #[serde(default)]
    pub user_info: Map<String, Json>,
}

impl AuditRecord {
    /// Create an unsaved record for an action on an entity type
    pub fn new(entity_type: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: None,
            initiator_record_id: None,
            entity_type: entity_type.into(),
            entity_id: None,
            action: action.into(),
            timestamp: Utc::now(),
            time_taken: None,
            description: None,
            request_diff: Diff::new(),
            reactive_diff: Diff::new(),
            is_reverted: false,
            revert_record_id: None,
            user_info: Map::new(),
        }
    }

    /// Persisted id, or a configuration error for a record never saved
    pub fn require_id(&self) -> AuditResult<AuditRecordId> {
        self.id
            .ok_or_else(|| AuditError::Configuration("Audit record has not been persisted".into()))
    }

    /// Whether either diff holds a change
    pub fn has_changes(&self) -> bool {
        !self.request_diff.is_empty() || !self.reactive_diff.is_empty()
    }

    /// Reject keys that are not overridable record fields
    pub fn check_field(key: &str) -> AuditResult<()> {
        if OVERRIDABLE_FIELDS.contains(&key) {
            Ok(())
        } else {
            Err(AuditError::Validation(format!(
                "'{}' is not a settable audit record field (allowed: {})",
                key,
                OVERRIDABLE_FIELDS.join(", ")
            )))
        }
    }

    /// Apply extra field values; fails without changes on an unknown key or bad value
    pub fn apply_fields(&mut self, fields: &Map<String, Json>) -> AuditResult<()> {
        let mut updated = self.clone();

        for (key, value) in fields {
            match key.as_str() {
                "action" => updated.action = field_value(key, value)?,
                "description" => updated.description = field_value(key, value)?,
                "request_diff" => updated.request_diff = field_value(key, value)?,
                "reactive_diff" => updated.reactive_diff = field_value(key, value)?,
                "user_info" => updated.user_info = field_value(key, value)?,
                "revert_record_id" => updated.revert_record_id = field_value(key, value)?,
                "is_reverted" => updated.is_reverted = field_value(key, value)?,
                other => return Self::check_field(other),
            }
        }

        *self = updated;
        Ok(())
    }

    /// Backend row (everything but the id)
    pub fn to_row(&self) -> AuditResult<Row> {
        match serde_json::to_value(self)? {
            Json::Object(mut row) => {
                row.remove("id");
                Ok(row)
            }
            other => Err(AuditError::Json(format!(
                "Audit record serialized to a non-object: {}",
                other
            ))),
        }
    }

    /// Rebuild a record from a backend row
    pub fn from_row(id: u64, mut row: Row) -> AuditResult<Self> {
        row.insert("id".into(), Json::from(id));
        serde_json::from_value(Json::Object(row)).map_err(|e| {
            AuditError::Json(format!("Failed to parse audit record {}: {}", id, e))
        })
    }

    /// Format the record for a one-line listing
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.action,
            self.entity_type
        );

        if let Some(entity_id) = self.entity_id {
            output.push_str(&format!(" #{}", entity_id));
        }

        if let Some(description) = self.description.as_deref().filter(|d| !d.is_empty()) {
            output.push_str(&format!(": {}", description));
        }

        output
    }
}

fn field_value<T: DeserializeOwned>(key: &str, value: &Json) -> AuditResult<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| AuditError::Validation(format!("Invalid value for '{}': {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spain_update() -> AuditRecord {
        let mut record = AuditRecord::new("country", "update");
        record.entity_id = Some(EntityId::new(1));
        record
            .request_diff
            .insert("name".into(), Change::new("Spain", "Espana"));
        record.description = Some("update Spain: name=Espana".into());
        record
    }

    #[test]
    fn test_change_serializes_as_pair() {
        let change = Change::new("Spain", "Espana");
        assert_eq!(serde_json::to_value(&change).unwrap(), json!(["Spain", "Espana"]));

        let parsed: Change = serde_json::from_value(json!([null, 3])).unwrap();
        assert_eq!(parsed, Change::new(Json::Null, 3));
    }

    #[test]
    fn test_row_conversion_keeps_fields() {
        let record = spain_update();
        let row = record.to_row().unwrap();
        assert!(!row.contains_key("id"));
        assert_eq!(row["request_diff"], json!({"name": ["Spain", "Espana"]}));
        assert_eq!(row["entity_id"], json!(1));

        let loaded = AuditRecord::from_row(4, row).unwrap();
        assert_eq!(loaded.id, Some(AuditRecordId::new(4)));
        assert_eq!(loaded.request_diff, record.request_diff);
        assert_eq!(loaded.description, record.description);
    }

    #[test]
    fn test_apply_fields() {
        let mut record = AuditRecord::new("country", "update");
        let fields = json!({
            "action": "undo update",
            "revert_record_id": 7,
            "description": "restored"
        });
        record.apply_fields(fields.as_object().unwrap()).unwrap();

        assert_eq!(record.action, "undo update");
        assert_eq!(record.revert_record_id, Some(AuditRecordId::new(7)));
        assert_eq!(record.description.as_deref(), Some("restored"));
    }

    #[test]
    fn test_apply_fields_rejects_unknown_keys_atomically() {
        let mut record = AuditRecord::new("country", "update");
        let fields = json!({"action": "renamed", "entity_type": "other"});

        let err = record.apply_fields(fields.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, AuditError::Validation(_)));
        assert_eq!(record.action, "update");
        assert_eq!(record.entity_type, "country");
    }

    #[test]
    fn test_apply_fields_rejects_bad_values() {
        let mut record = AuditRecord::new("country", "update");
        let fields = json!({"is_reverted": "yes"});
        assert!(record.apply_fields(fields.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_has_changes() {
        assert!(!AuditRecord::new("country", "comment").has_changes());
        assert!(spain_update().has_changes());
    }

    #[test]
    fn test_require_id() {
        assert!(AuditRecord::new("country", "create")
            .require_id()
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_human_readable_format() {
        let formatted = spain_update().format_human_readable();
        assert!(formatted.contains("update country #1"));
        assert!(formatted.ends_with(": update Spain: name=Espana"));
    }
}
