//! Entity schema descriptors
//!
//! A host entity's schema is supplied from outside the audit engine, either
//! built in code or deserialized from a JSON/YAML schema file. Per-field audit
//! metadata is resolved once into a [`FieldPolicy`] instead of being probed
//! every time a diff is computed.

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};

/// Storage type of a host entity field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Short string (default)
    #[default]
    String,
    /// Long text
    Text,
    Boolean,
    Integer,
    Float,
    /// Decimal amount, rendered with two decimals
    Money,
    /// Calendar date
    Date,
    /// Date and time without timezone
    DateTime,
    /// Time of day
    Time,
    /// Structured list or map, stored as JSON
    Array,
    /// Opaque structured value, stored as its JSON text
    Object,
    /// String restricted to a fixed set of values
    Enum(Vec<String>),
}

impl FieldType {
    /// Whether values of this type are stored as strings that must be
    /// decoded before they can be compared with or assigned to a live entity
    pub fn needs_decode(&self) -> bool {
        matches!(
            self,
            Self::Date | Self::DateTime | Self::Time | Self::Object
        )
    }

    /// Short lowercase name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Money => "money",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Time => "time",
            Self::Array => "array",
            Self::Object => "object",
            Self::Enum(_) => "enum",
        }
    }
}

/// Definition of a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,

    /// Storage type
    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    /// Never record this field in audit diffs
    #[serde(default)]
    pub no_audit: bool,

    /// Field lives only in memory; never loaded or saved
    #[serde(default)]
    pub never_persist: bool,

    /// Field is loaded but never written (derived by the backend)
    #[serde(default)]
    pub never_save: bool,

    /// Field cannot be changed through the entity
    #[serde(default)]
    pub read_only: bool,

    /// Default value in stored form, applied on insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl FieldDef {
    /// Create a plain field of the given type
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            no_audit: false,
            never_persist: false,
            never_save: false,
            read_only: false,
            default: None,
        }
    }

    pub fn no_audit(mut self) -> Self {
        self.no_audit = true;
        self
    }

    pub fn never_persist(mut self) -> Self {
        self.never_persist = true;
        self
    }

    pub fn never_save(mut self) -> Self {
        self.never_save = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Set the default value (stored form)
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Resolve the audit policy for this field
    pub fn policy(&self) -> FieldPolicy {
        FieldPolicy {
            auditable: !(self.no_audit || self.never_persist || self.never_save || self.read_only),
            needs_decode: self.field_type.needs_decode(),
        }
    }

    /// Whether the field is read from the backend
    pub fn is_loaded(&self) -> bool {
        !self.never_persist
    }

    /// Whether the field is written to the backend
    pub fn is_saved(&self) -> bool {
        !(self.never_persist || self.never_save || self.read_only)
    }
}

/// Audit metadata resolved once per field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPolicy {
    /// Field may appear in request/reactive diffs
    pub auditable: bool,
    /// Stored diff values must be decoded before use
    pub needs_decode: bool,
}

/// Schema of one host entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Stable type identifier, recorded on every audit record
    pub type_id: String,

    /// Backend table; defaults to the type id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Field whose value names a record in descriptions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_field: Option<String>,

    /// Field definitions
    #[serde(default)]
    pub fields: Vec<FieldDef>,

    /// Skip auditing for this type entirely
    #[serde(default)]
    pub no_audit: bool,
}

impl EntitySchema {
    /// Create an empty schema
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            table: None,
            title_field: None,
            fields: Vec::new(),
            no_audit: false,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_title_field(mut self, field: impl Into<String>) -> Self {
        self.title_field = Some(field.into());
        self
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn no_audit(mut self) -> Self {
        self.no_audit = true;
        self
    }

    /// Backend table name
    pub fn table(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.type_id)
    }

    /// Look up a field definition
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }

    /// Title field, if the schema declares one that exists
    pub fn title_field(&self) -> Option<&str> {
        self.title_field
            .as_deref()
            .filter(|name| self.has_field(name))
    }

    /// Check the schema is internally consistent
    pub fn validate(&self) -> AuditResult<()> {
        if self.type_id.trim().is_empty() {
            return Err(AuditError::Validation("Entity type id cannot be empty".into()));
        }

        for (i, field) in self.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(AuditError::Validation(format!(
                    "Field {} of '{}' has an empty name",
                    i, self.type_id
                )));
            }
            if field.name == "id" {
                return Err(AuditError::Validation(format!(
                    "'{}' declares a field named 'id'; ids are managed by the backend",
                    self.type_id
                )));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(AuditError::Validation(format!(
                    "'{}' declares field '{}' twice",
                    self.type_id, field.name
                )));
            }
        }

        if let Some(title) = &self.title_field {
            if !self.has_field(title) {
                return Err(AuditError::Validation(format!(
                    "Title field '{}' is not a field of '{}'",
                    title, self.type_id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn country() -> EntitySchema {
        EntitySchema::new("country")
            .with_title_field("name")
            .with_field(FieldDef::new("name", FieldType::String))
            .with_field(FieldDef::new("code", FieldType::String).no_audit())
            .with_field(FieldDef::new("population", FieldType::Integer).with_default(json!(0)))
    }

    #[test]
    fn test_policy_resolution() {
        assert!(FieldDef::new("a", FieldType::String).policy().auditable);
        assert!(!FieldDef::new("a", FieldType::String).no_audit().policy().auditable);
        assert!(!FieldDef::new("a", FieldType::String).never_persist().policy().auditable);
        assert!(!FieldDef::new("a", FieldType::String).never_save().policy().auditable);
        assert!(!FieldDef::new("a", FieldType::String).read_only().policy().auditable);

        assert!(FieldDef::new("d", FieldType::Date).policy().needs_decode);
        assert!(FieldDef::new("o", FieldType::Object).policy().needs_decode);
        assert!(!FieldDef::new("a", FieldType::Array).policy().needs_decode);
    }

    #[test]
    fn test_table_defaults_to_type_id() {
        assert_eq!(country().table(), "country");
        assert_eq!(country().with_table("countries").table(), "countries");
    }

    #[test]
    fn test_validate_rejects_duplicates_and_id() {
        assert!(country().validate().is_ok());

        let dup = country().with_field(FieldDef::new("name", FieldType::Text));
        assert!(dup.validate().is_err());

        let id = country().with_field(FieldDef::new("id", FieldType::Integer));
        assert!(id.validate().is_err());

        let bad_title = EntitySchema::new("x").with_title_field("missing");
        assert!(bad_title.validate().is_err());
    }

    #[test]
    fn test_schema_from_json() {
        let schema: EntitySchema = serde_json::from_value(json!({
            "type_id": "user",
            "title_field": "name",
            "fields": [
                {"name": "name"},
                {"name": "gender", "type": {"enum": ["M", "F"]}},
                {"name": "born", "type": "date"},
                {"name": "secret", "never_save": true}
            ]
        }))
        .unwrap();

        assert_eq!(schema.get_field("name").unwrap().field_type, FieldType::String);
        assert_eq!(
            schema.get_field("gender").unwrap().field_type,
            FieldType::Enum(vec!["M".into(), "F".into()])
        );
        assert_eq!(schema.get_field("born").unwrap().field_type, FieldType::Date);
        assert!(!schema.get_field("secret").unwrap().policy().auditable);
        assert_eq!(schema.title_field(), Some("name"));
    }
}
