//! Command-line workspace
//!
//! Everything a command needs, opened from the data directory: settings,
//! entity schemas, the file-backed store and the audit controller attached
//! to every registered type.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audit::{AuditController, AuditLog};
use crate::config::{AuditPaths, AuditSettings};
use crate::error::{AuditError, AuditResult};
use crate::host::{load_schemas, Context, Entity, EntityRegistry};
use crate::models::{EntityId, FieldDef, FieldType, Value};
use crate::storage::{MemoryStore, Persistence};
use crate::undo::UndoEngine;

pub struct Workspace {
    pub paths: AuditPaths,
    pub settings: AuditSettings,
    pub registry: Arc<EntityRegistry>,
    pub persistence: Arc<dyn Persistence>,
    pub controller: Arc<AuditController>,
}

impl Workspace {
    /// Open the workspace; `schema` overrides the schema file in the data directory
    pub fn open(paths: AuditPaths, schema: Option<&Path>) -> AuditResult<Self> {
        let settings = AuditSettings::load_or_create(&paths)?;

        let schema_file: PathBuf = schema
            .map(Path::to_path_buf)
            .unwrap_or_else(|| paths.schema_file());
        if !schema_file.exists() {
            return Err(AuditError::Configuration(format!(
                "No entity schemas found at {} (pass --schema or create it)",
                schema_file.display()
            )));
        }

        let registry = Arc::new(EntityRegistry::from_schemas(load_schemas(&schema_file)?)?);

        paths.ensure_directories()?;
        let persistence: Arc<dyn Persistence> = Arc::new(MemoryStore::open(paths.store_file())?);

        let controller = Arc::new(AuditController::new(settings.clone()));
        for kind in registry.types() {
            controller.set_up(&kind)?;
        }

        tracing::debug!(
            schema = %schema_file.display(),
            types = registry.len(),
            "opened workspace"
        );

        Ok(Self {
            paths,
            settings,
            registry,
            persistence,
            controller,
        })
    }

    pub fn log(&self) -> AuditLog {
        AuditLog::new(Arc::clone(&self.persistence), self.settings.audit_table.clone())
    }

    pub fn engine(&self) -> UndoEngine {
        UndoEngine::new(Arc::clone(&self.registry), self.settings.audit_table.clone())
    }

    /// Load an entity by type and id
    pub fn load(&self, entity_type: &str, id: u64) -> AuditResult<Entity> {
        let kind = self.registry.get(entity_type)?;
        kind.load(Arc::clone(&self.persistence), EntityId::new(id))
    }

    /// Apply `field=value` assignments to an entity
    pub fn assign(&self, entity: &mut Entity, assignments: &[String]) -> AuditResult<()> {
        for assignment in assignments {
            let (field, raw) = parse_assignment(assignment)?;
            let def = entity.kind().schema().get_field(field).cloned().ok_or_else(|| {
                AuditError::Validation(format!(
                    "'{}' has no field named '{}'",
                    entity.type_id(),
                    field
                ))
            })?;
            entity.set(field, parse_value(&def, raw)?)?;
        }
        Ok(())
    }

    pub fn context(&self) -> Context {
        Context::new()
    }
}

/// Split `field=value`
pub fn parse_assignment(assignment: &str) -> AuditResult<(&str, &str)> {
    match assignment.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => Ok((field.trim(), value)),
        _ => Err(AuditError::Validation(format!(
            "Expected field=value, got '{}'",
            assignment
        ))),
    }
}

/// Interpret command-line text as a value of the field's type
///
/// `null` clears the field. Textual and temporal types take the text as is;
/// other types parse it as JSON, falling back to a plain string.
pub fn parse_value(def: &FieldDef, raw: &str) -> AuditResult<Value> {
    if raw == "null" {
        return Ok(Value::Null);
    }

    let stored = match def.field_type {
        FieldType::String
        | FieldType::Text
        | FieldType::Enum(_)
        | FieldType::Date
        | FieldType::DateTime
        | FieldType::Time
        | FieldType::Object => serde_json::Value::String(raw.to_string()),
        _ => serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
    };

    def.field_type.from_stored(&stored)
}
