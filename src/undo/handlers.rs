//! Per-action undo handlers
//!
//! Each handler reverses one audit record by performing an ordinary entity
//! mutation, so the reversal is itself audited by the entity's controller.

use std::sync::Arc;

use serde_json::Value as Json;

use crate::audit::AuditRecord;
use crate::error::{AuditError, AuditResult};
use crate::host::{Context, Entity, EntityType};
use crate::models::{stored_eq, EntityId, FieldDef, Value};
use crate::storage::Persistence;

/// What a handler operates on
pub struct UndoTarget<'a> {
    pub kind: &'a Arc<EntityType>,
    pub persistence: &'a Arc<dyn Persistence>,
    pub record: &'a AuditRecord,
}

impl<'a> UndoTarget<'a> {
    pub fn entity_id(&self) -> AuditResult<EntityId> {
        self.record.entity_id.ok_or_else(|| {
            AuditError::Configuration(format!(
                "Audit record {} does not reference a persisted '{}'",
                self.record
                    .id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "(unsaved)".into()),
                self.record.entity_type
            ))
        })
    }

    /// Load the entity the record refers to
    pub fn load(&self) -> AuditResult<Entity> {
        self.kind.load(Arc::clone(self.persistence), self.entity_id()?)
    }

    /// Field definition for a diff entry; `None` when the field left the schema
    pub fn field(&self, name: &str) -> Option<&'a FieldDef> {
        self.kind.schema().get_field(name)
    }

    /// Decode a stored diff value for a field
    pub fn decode(&self, def: &FieldDef, stored: &Json) -> AuditResult<Value> {
        self.persistence.typecast_load(def, stored)
    }
}

/// Reverses one kind of action
pub trait UndoHandler: Send + Sync {
    fn undo(&self, target: &UndoTarget<'_>, ctx: &mut Context) -> AuditResult<()>;
}

/// Undo of `update`: verify every field still holds the recorded new value,
/// then restore the old values with a single save
#[derive(Debug, Default, Clone, Copy)]
pub struct RevertUpdate;

impl UndoHandler for RevertUpdate {
    fn undo(&self, target: &UndoTarget<'_>, ctx: &mut Context) -> AuditResult<()> {
        let mut entity = target.load()?;
        let mut restore = Vec::new();

        for (field, change) in &target.record.request_diff {
            let Some(def) = target.field(field) else {
                continue;
            };

            let unchanged = if def.policy().needs_decode {
                target.decode(def, &change.new)? == *entity.get(field)?
            } else {
                stored_eq(&entity.get_stored(field)?, &change.new)
            };

            if !unchanged {
                return Err(AuditError::Integrity {
                    field: field.clone(),
                    expected: change.new.to_string(),
                    current: entity.get_stored(field)?.to_string(),
                });
            }

            restore.push((field.as_str(), target.decode(def, &change.old)?));
        }

        for (field, value) in restore {
            entity.set(field, value)?;
        }
        entity.save(ctx)
    }
}

/// Undo of `delete`: re-create the row under its original id
#[derive(Debug, Default, Clone, Copy)]
pub struct RestoreDelete;

impl UndoHandler for RestoreDelete {
    fn undo(&self, target: &UndoTarget<'_>, ctx: &mut Context) -> AuditResult<()> {
        let id = target.entity_id()?;
        let mut entity = target.kind.new_entity(Arc::clone(target.persistence));

        for (field, change) in &target.record.request_diff {
            let Some(def) = target.field(field) else {
                continue;
            };
            if def.read_only {
                continue;
            }
            entity.set(field, target.decode(def, &change.old)?)?;
        }

        entity.save_as(ctx, id)
    }
}

/// Undo of `create`: delete the created row
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveCreate;

impl UndoHandler for RemoveCreate {
    fn undo(&self, target: &UndoTarget<'_>, ctx: &mut Context) -> AuditResult<()> {
        target.load()?.delete(ctx)
    }
}

/// For derived actions whose effect is reversed by undoing their cause
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUndo;

impl UndoHandler for NoopUndo {
    fn undo(&self, _target: &UndoTarget<'_>, _ctx: &mut Context) -> AuditResult<()> {
        Ok(())
    }
}

/// Built-in handlers, including redo of records written by an undo
pub fn default_handlers() -> Vec<(&'static str, Arc<dyn UndoHandler>)> {
    vec![
        ("create", Arc::new(RemoveCreate)),
        ("update", Arc::new(RevertUpdate)),
        ("delete", Arc::new(RestoreDelete)),
        ("undo create", Arc::new(RestoreDelete)),
        ("undo update", Arc::new(RevertUpdate)),
        ("undo delete", Arc::new(RemoveCreate)),
    ]
}
