//! Undo engine
//!
//! Undoing a record reverses it together with every record it initiated,
//! newest first, inside one transaction. Each reversal is tagged on the
//! context with the action `undo <action>` and a back-link to the reverted
//! record, and the reverted records are marked `is_reverted`. Any failure
//! rolls back the host rows and the audit trail alike.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::handlers::{default_handlers, UndoHandler, UndoTarget};
use crate::audit::{AuditLog, AuditRecord};
use crate::error::{AuditError, AuditResult};
use crate::host::{Context, EntityRegistry, EntityType};
use crate::models::AuditRecordId;
use crate::storage::{atomic, Persistence};

/// Reverts audit records through per-action handlers
///
/// Handlers are keyed by the record's action. The built-in set covers
/// `create`, `update` and `delete` plus their `undo ...` counterparts, which
/// makes undoing an undo record a redo.
pub struct UndoEngine {
    registry: Arc<EntityRegistry>,
    handlers: BTreeMap<String, Arc<dyn UndoHandler>>,
    audit_table: String,
}

impl UndoEngine {
    /// Engine with the built-in handlers, reading records from `audit_table`
    pub fn new(registry: Arc<EntityRegistry>, audit_table: impl Into<String>) -> Self {
        let handlers = default_handlers()
            .into_iter()
            .map(|(action, handler)| (action.to_string(), handler))
            .collect();

        Self {
            registry,
            handlers,
            audit_table: audit_table.into(),
        }
    }

    /// Register (or replace) the handler for an action
    pub fn register(&mut self, action: impl Into<String>, handler: impl UndoHandler + 'static) {
        self.handlers.insert(action.into(), Arc::new(handler));
    }

    pub fn handler(&self, action: &str) -> AuditResult<Arc<dyn UndoHandler>> {
        self.handlers
            .get(action)
            .cloned()
            .ok_or_else(|| AuditError::UnsupportedAction(action.to_string()))
    }

    pub fn log(&self, persistence: &Arc<dyn Persistence>) -> AuditLog {
        AuditLog::new(Arc::clone(persistence), self.audit_table.clone())
    }

    /// Check a record can be reverted and resolve its entity type
    fn prepare(&self, record: &AuditRecord) -> AuditResult<Arc<EntityType>> {
        let id = record.require_id()?;

        if record.entity_id.is_none() {
            return Err(AuditError::Configuration(format!(
                "Audit record {} does not reference a persisted '{}'",
                id, record.entity_type
            )));
        }

        let kind = self.registry.get(&record.entity_type)?;
        if kind.controller().is_none() {
            return Err(AuditError::Configuration(format!(
                "'{}' is not set up for auditing",
                record.entity_type
            )));
        }

        self.handler(&record.action)?;
        Ok(kind)
    }

    /// Undo a record by id; returns the record as now stored
    pub fn undo(
        &self,
        persistence: &Arc<dyn Persistence>,
        ctx: &mut Context,
        record_id: AuditRecordId,
    ) -> AuditResult<AuditRecord> {
        let root = self.log(persistence).load(record_id)?;
        self.undo_record(persistence, ctx, &root)
    }

    /// Undo a loaded record and everything it initiated
    ///
    /// The record is re-read from the log first, so a stale copy cannot
    /// revert it twice.
    pub fn undo_record(
        &self,
        persistence: &Arc<dyn Persistence>,
        ctx: &mut Context,
        record: &AuditRecord,
    ) -> AuditResult<AuditRecord> {
        let root_id = record.require_id()?;
        let log = self.log(persistence);
        let root = log.load(root_id)?;
        if root.is_reverted {
            return Err(AuditError::AlreadyReverted(root_id));
        }
        self.prepare(&root)?;

        let depth = ctx.audit.depth();

        let result = atomic(persistence.as_ref(), || {
            let mut pending: Vec<AuditRecord> = log
                .subtree(root_id)?
                .into_iter()
                .filter(|r| !r.is_reverted)
                .collect();
            pending.sort_by(|a, b| b.id.cmp(&a.id));
            pending.push(root.clone());

            let reverted = pending.len();
            for target in &pending {
                self.revert_one(persistence, ctx, &log, target)?;
            }

            info!(
                record = %root.format_human_readable(),
                reverted,
                "undo complete"
            );
            log.load(root_id)
        });

        if result.is_err() {
            ctx.audit.unwind(depth);
            ctx.audit.clear_overrides();
        }
        result
    }

    fn revert_one(
        &self,
        persistence: &Arc<dyn Persistence>,
        ctx: &mut Context,
        log: &AuditLog,
        record: &AuditRecord,
    ) -> AuditResult<()> {
        let id = record.require_id()?;
        let kind = self.prepare(record)?;
        let handler = self.handler(&record.action)?;

        ctx.audit.clear_overrides();
        ctx.audit.set_custom_action(format!("undo {}", record.action));
        ctx.audit.set_custom_field("revert_record_id", id.get())?;

        let target = UndoTarget {
            kind: &kind,
            persistence,
            record,
        };
        let outcome = handler.undo(&target, ctx);
        ctx.audit.clear_overrides();
        outcome?;

        let mut stored = log.load(id)?;
        stored.is_reverted = true;
        log.update(&stored)?;

        debug!(record = %id, action = %record.action, "reverted audit record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditController;
    use crate::config::AuditSettings;
    use crate::models::{EntitySchema, FieldDef, FieldType, Value};
    use crate::storage::MemoryStore;

    struct Fixture {
        engine: UndoEngine,
        persistence: Arc<dyn Persistence>,
        country: Arc<EntityType>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(EntityRegistry::new());
        let country = registry
            .register(
                EntitySchema::new("country")
                    .with_title_field("name")
                    .with_field(FieldDef::new("name", FieldType::String)),
            )
            .unwrap();
        let settings = AuditSettings::default();
        let controller = Arc::new(AuditController::new(settings.clone()));
        controller.set_up(&country).unwrap();

        Fixture {
            engine: UndoEngine::new(registry, settings.audit_table),
            persistence: Arc::new(MemoryStore::new()),
            country,
        }
    }

    #[test]
    fn test_undo_update_restores_value() {
        let fx = fixture();
        let mut ctx = Context::new();

        let mut spain = fx.country.new_entity(Arc::clone(&fx.persistence));
        spain.set("name", "Spain").unwrap();
        spain.save(&mut ctx).unwrap();
        spain.set("name", "Espana").unwrap();
        spain.save(&mut ctx).unwrap();

        let log = fx.engine.log(&fx.persistence);
        let update = log.read_all().unwrap().pop().unwrap();
        let reverted = fx.engine.undo_record(&fx.persistence, &mut ctx, &update).unwrap();
        assert!(reverted.is_reverted);

        spain.reload().unwrap();
        assert_eq!(spain.get("name").unwrap(), &Value::from("Spain"));

        let undo = log.read_all().unwrap().pop().unwrap();
        assert_eq!(undo.action, "undo update");
        assert_eq!(undo.revert_record_id, update.id);
        assert!(ctx.is_idle());
    }

    #[test]
    fn test_undo_twice_is_rejected() {
        let fx = fixture();
        let mut ctx = Context::new();

        let mut spain = fx.country.new_entity(Arc::clone(&fx.persistence));
        spain.set("name", "Spain").unwrap();
        spain.save(&mut ctx).unwrap();

        let log = fx.engine.log(&fx.persistence);
        let create = log.read_all().unwrap().remove(0);
        let reverted = fx.engine.undo_record(&fx.persistence, &mut ctx, &create).unwrap();

        let err = fx.engine.undo_record(&fx.persistence, &mut ctx, &reverted).unwrap_err();
        assert!(matches!(err, AuditError::AlreadyReverted(_)));
    }

    #[test]
    fn test_stale_copy_cannot_revert_twice() {
        let fx = fixture();
        let mut ctx = Context::new();

        let mut spain = fx.country.new_entity(Arc::clone(&fx.persistence));
        spain.set("name", "Spain").unwrap();
        spain.save(&mut ctx).unwrap();
        spain.set("name", "Espana").unwrap();
        spain.save(&mut ctx).unwrap();

        let log = fx.engine.log(&fx.persistence);
        let update = log.read_all().unwrap().pop().unwrap();
        fx.engine.undo_record(&fx.persistence, &mut ctx, &update).unwrap();

        spain.reload().unwrap();
        spain.set("name", "Espana").unwrap();
        spain.save(&mut ctx).unwrap();

        let err = fx.engine.undo_record(&fx.persistence, &mut ctx, &update).unwrap_err();
        assert!(matches!(err, AuditError::AlreadyReverted(id) if Some(id) == update.id));

        let undos = log
            .read_all()
            .unwrap()
            .into_iter()
            .filter(|r| r.revert_record_id == update.id)
            .count();
        assert_eq!(undos, 1);
        assert!(ctx.is_idle());
    }

    #[test]
    fn test_unknown_action_is_unsupported() {
        let fx = fixture();
        let mut ctx = Context::new();

        let mut spain = fx.country.new_entity(Arc::clone(&fx.persistence));
        spain.set("name", "Spain").unwrap();
        spain.save(&mut ctx).unwrap();
        let comment = crate::audit::custom_log(&spain, &mut ctx, "comment", Some("hi"), None).unwrap();

        let err = fx.engine.undo_record(&fx.persistence, &mut ctx, &comment).unwrap_err();
        assert!(matches!(err, AuditError::UnsupportedAction(ref a) if a == "comment"));
    }

    #[test]
    fn test_missing_record() {
        let fx = fixture();
        let mut ctx = Context::new();
        let err = fx
            .engine
            .undo(&fx.persistence, &mut ctx, AuditRecordId::new(99))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
