//! Audit controller
//!
//! Hooks into an entity type at the outermost priorities so that every other
//! observer runs inside the audit envelope:
//!
//! ```text
//! before-save  (first)  push, request diff, update description
//!   ... other observers, backend write, nested saves ...
//! after-save   (last)   pull, reactive diff, keep or delete the record
//! ```
//!
//! Records are persisted at push time so nested operations can reference the
//! still-open record as their initiator.

use std::sync::Arc;

use serde_json::{Map, Value as Json};
use tracing::{debug, warn};
use uuid::Uuid;

use super::diff::{compute_diff, purge_requested, render_diff, snapshot_for_create, snapshot_for_delete};
use super::log::{AuditLog, Jail};
use super::record::{AuditRecord, Diff};
use crate::config::AuditSettings;
use crate::error::{AuditError, AuditResult};
use crate::host::{Context, Entity, EntityType, HookArgs, HookPoint};
use crate::models::{AuditRecordId, EntityId};
use crate::storage::atomic;

/// Custom update descriptions
pub trait Describer: Send + Sync {
    /// Description for a record; `None` keeps the default
    fn describe(&self, entity: &Entity, record: &AuditRecord) -> Option<String>;
}

/// Audits every mutation of the entity types it is set up on
///
/// One controller can serve many types; per-call state lives on the
/// [`Context`] passed through each save or delete.
pub struct AuditController {
    settings: AuditSettings,
    describer: Option<Arc<dyn Describer>>,
    session: Uuid,
}

impl AuditController {
    pub fn new(settings: AuditSettings) -> Self {
        Self {
            settings,
            describer: None,
            session: Uuid::new_v4(),
        }
    }

    pub fn with_describer(mut self, describer: impl Describer + 'static) -> Self {
        self.describer = Some(Arc::new(describer));
        self
    }

    pub fn settings(&self) -> &AuditSettings {
        &self.settings
    }

    /// Id shared by every record this controller writes
    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Register the four audit hooks on an entity type
    ///
    /// Returns false when the type opts out of auditing or already has a
    /// controller.
    pub fn set_up(self: &Arc<Self>, kind: &Arc<EntityType>) -> AuditResult<bool> {
        if kind.schema().no_audit {
            debug!(entity_type = kind.type_id(), "entity type opts out of auditing");
            return Ok(false);
        }

        if kind.table() == self.settings.audit_table {
            return Err(AuditError::Configuration(format!(
                "'{}' is stored in the audit table and cannot be audited",
                kind.type_id()
            )));
        }

        if !kind.attach_controller(Arc::clone(self))? {
            return Ok(false);
        }

        let controller = Arc::clone(self);
        kind.on_outermost(HookPoint::BeforeSave, move |entity, ctx, args| {
            match args {
                HookArgs::Save { is_update } => controller.before_save(entity, ctx, *is_update),
                HookArgs::Delete { .. } => Ok(()),
            }
        })?;

        let controller = Arc::clone(self);
        kind.on_outermost(HookPoint::BeforeDelete, move |entity, ctx, args| {
            match args {
                HookArgs::Delete { id } => controller.before_delete(entity, ctx, *id),
                HookArgs::Save { .. } => Ok(()),
            }
        })?;

        let controller = Arc::clone(self);
        kind.on_outermost(HookPoint::AfterSave, move |entity, ctx, args| {
            match args {
                HookArgs::Save { is_update } => controller.after_save(entity, ctx, *is_update),
                HookArgs::Delete { .. } => Ok(()),
            }
        })?;

        let controller = Arc::clone(self);
        kind.on_outermost(HookPoint::AfterDelete, move |entity, ctx, args| {
            match args {
                HookArgs::Delete { id } => controller.after_delete(entity, ctx, *id),
                HookArgs::Save { .. } => Ok(()),
            }
        })?;

        debug!(entity_type = kind.type_id(), "audit hooks registered");
        Ok(true)
    }

    /// Audit log in the backend an entity is bound to
    pub fn log_for(&self, entity: &Entity) -> AuditLog {
        AuditLog::new(Arc::clone(entity.persistence()), self.settings.audit_table.clone())
    }

    fn user_info(&self) -> Map<String, Json> {
        let mut info: Map<String, Json> = self
            .settings
            .user_info
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        info.insert("session".into(), Json::String(self.session.to_string()));
        info
    }

    /// Open a record for an action on `entity` and persist it
    pub fn push(&self, entity: &Entity, ctx: &mut Context, action: &str) -> AuditResult<AuditRecordId> {
        let mut record = AuditRecord::new(entity.type_id(), action);
        record.entity_id = entity.id();
        record.user_info = self.user_info();
        record.initiator_record_id = ctx.audit.top_id();

        ctx.audit.take_overrides().apply(&mut record)?;

        let id = self.log_for(entity).insert(&mut record)?;
        debug!(
            record = %id,
            action = %record.action,
            entity_type = entity.type_id(),
            depth = ctx.audit.depth() + 1,
            "pushed audit record"
        );

        ctx.audit.push(record);
        Ok(id)
    }

    /// Close the innermost record and return it for finalization
    pub fn pull(&self, ctx: &mut Context) -> AuditResult<AuditRecord> {
        let (mut record, elapsed) = ctx.audit.pop()?;

        ctx.audit.take_overrides().apply(&mut record)?;

        if self.settings.record_time_taken {
            record.time_taken = Some(elapsed.as_secs_f64());
        }

        debug!(
            record = ?record.id,
            action = %record.action,
            depth = ctx.audit.depth(),
            "pulled audit record"
        );
        Ok(record)
    }

    /// Render a diff against an entity's schema
    pub fn render_diff(&self, diff: &Diff, entity: &Entity) -> AuditResult<String> {
        render_diff(diff, entity.kind())
    }

    fn describe_update(&self, entity: &Entity, record: &AuditRecord) -> AuditResult<String> {
        if let Some(text) = self.describer.as_ref().and_then(|d| d.describe(entity, record)) {
            return Ok(text);
        }

        let rendered = render_diff(&record.request_diff, entity.kind())?;
        Ok(match entity.original_title() {
            Some(title) => format!("{} {}: {}", record.action, title, rendered),
            None => format!("{} {}: {}", record.action, entity.type_id(), rendered),
        })
    }

    fn before_save(&self, entity: &mut Entity, ctx: &mut Context, is_update: bool) -> AuditResult<()> {
        let action = if is_update { "update" } else { "create" };
        self.push(entity, ctx, action)?;

        let request_diff = compute_diff(entity);
        let record = ctx.audit.top_mut()?;
        record.request_diff = request_diff;

        if is_update && record.description.is_none() {
            let description = self.describe_update(entity, record)?;
            record.description = Some(description);
        }
        Ok(())
    }

    fn after_save(&self, entity: &mut Entity, ctx: &mut Context, _is_update: bool) -> AuditResult<()> {
        let mut record = self.pull(ctx)?;
        let id = record.require_id()?;

        if record.entity_id.is_none() {
            record.entity_id = Some(entity.require_id()?);
            record.reactive_diff = snapshot_for_create(entity);

            if record.description.is_none() {
                record.description = self
                    .describer
                    .as_ref()
                    .and_then(|d| d.describe(entity, &record));
            }
        } else {
            let reactive = purge_requested(compute_diff(entity), &record.request_diff);

            let undescribed = record.description.as_deref().map_or(true, str::is_empty);
            if !reactive.is_empty() && undescribed {
                record.description = Some(format!(
                    "(resulted in {})",
                    render_diff(&reactive, entity.kind())?
                ));
            }
            record.reactive_diff = reactive;
        }

        let log = self.log_for(entity);
        if record.has_changes() {
            log.update(&record)?;
            debug!(record = %id, action = %record.action, "finalized audit record");
        } else {
            log.delete(id)?;
            warn!(
                record = %id,
                entity_type = entity.type_id(),
                "save changed nothing; dropped empty audit record"
            );
        }
        Ok(())
    }

    fn before_delete(&self, entity: &mut Entity, ctx: &mut Context, id: EntityId) -> AuditResult<()> {
        self.push(entity, ctx, "delete")?;

        if entity.projection().is_some() {
            entity.clear_projection();
            entity.reload()?;
        }

        let request_diff = snapshot_for_delete(entity);
        let title = entity.title();
        let record = ctx.audit.top_mut()?;
        record.request_diff = request_diff;

        if record.description.is_none() {
            let mut description = format!("{} id={}", record.action, id);
            if let Some(title) = title {
                description.push_str(&format!(" ({})", title));
            }
            record.description = Some(description);
        }
        Ok(())
    }

    fn after_delete(&self, entity: &mut Entity, ctx: &mut Context, _id: EntityId) -> AuditResult<()> {
        let record = self.pull(ctx)?;
        self.log_for(entity).update(&record)?;
        debug!(record = ?record.id, "finalized delete record");
        Ok(())
    }

    /// Write a one-shot manual record such as a comment
    ///
    /// Without a description the record is described as `<action> <title>: `
    /// (or just the action when the type has no title field). Extra fields
    /// are limited to the overridable record fields.
    pub fn custom_log(
        &self,
        entity: &Entity,
        ctx: &mut Context,
        action: &str,
        description: Option<&str>,
        extra: Option<&Map<String, Json>>,
    ) -> AuditResult<AuditRecord> {
        let depth = ctx.audit.depth();
        let persistence = Arc::clone(entity.persistence());

        let result = atomic(persistence.as_ref(), || {
            self.push(entity, ctx, action)?;

            let description = match (description, entity.kind().schema().title_field()) {
                (Some(text), _) => text.to_string(),
                (None, Some(title_field)) => format!("{} {}: ", action, entity.get(title_field)?),
                (None, None) => action.to_string(),
            };

            let record = ctx.audit.top_mut()?;
            record.description = Some(description);
            if let Some(fields) = extra {
                record.apply_fields(fields)?;
            }

            let record = self.pull(ctx)?;
            self.log_for(entity).update(&record)?;
            Ok(record)
        });

        if result.is_err() {
            ctx.audit.unwind(depth);
        }
        result
    }

    /// Most recent record of an entity's own trail
    pub fn load_last(&self, entity: &Entity) -> AuditResult<Option<AuditRecord>> {
        self.log_for(entity).load_last(&Jail::of(entity))
    }

    /// An entity's trail, newest first
    pub fn trail(&self, entity: &Entity, limit: Option<usize>) -> AuditResult<Vec<AuditRecord>> {
        self.log_for(entity).query(Some(&Jail::of(entity)), limit)
    }
}

/// The controller set up on an entity's type
pub fn controller_for(entity: &Entity) -> AuditResult<Arc<AuditController>> {
    entity.kind().controller().ok_or_else(|| {
        AuditError::Configuration(format!(
            "'{}' is not set up for auditing",
            entity.type_id()
        ))
    })
}

/// [`AuditController::custom_log`] through the entity's own controller
pub fn custom_log(
    entity: &Entity,
    ctx: &mut Context,
    action: &str,
    description: Option<&str>,
    extra: Option<&Map<String, Json>>,
) -> AuditResult<AuditRecord> {
    controller_for(entity)?.custom_log(entity, ctx, action, description, extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::record::Change;
    use crate::host::PRIORITY_DEFAULT;
    use crate::models::{EntitySchema, FieldDef, FieldType};
    use crate::storage::{MemoryStore, Persistence};
    use serde_json::json;

    fn setup() -> (Arc<EntityType>, Arc<dyn Persistence>, Arc<AuditController>) {
        let kind = EntityType::new(
            EntitySchema::new("country")
                .with_title_field("name")
                .with_field(FieldDef::new("name", FieldType::String))
                .with_field(FieldDef::new("code", FieldType::String)),
        )
        .unwrap();
        let controller = Arc::new(AuditController::new(AuditSettings::default()));
        assert!(controller.set_up(&kind).unwrap());
        (kind, Arc::new(MemoryStore::new()), controller)
    }

    #[test]
    fn test_update_record() {
        let (kind, persistence, controller) = setup();
        let mut ctx = Context::new();

        let mut spain = kind.new_entity(Arc::clone(&persistence));
        spain.set("name", "Spain").unwrap();
        spain.save(&mut ctx).unwrap();

        spain.set("name", "Espana").unwrap();
        spain.save(&mut ctx).unwrap();

        let record = controller.load_last(&spain).unwrap().unwrap();
        assert_eq!(record.action, "update");
        assert_eq!(record.request_diff["name"], Change::new("Spain", "Espana"));
        assert!(record.reactive_diff.is_empty());
        assert_eq!(record.description.as_deref(), Some("update Spain: name=Espana"));
        assert_eq!(
            record.user_info["session"],
            json!(controller.session().to_string())
        );
        assert!(record.time_taken.is_some());
        assert!(ctx.is_idle());
    }

    #[test]
    fn test_create_record_binds_entity_id() {
        let (kind, persistence, controller) = setup();
        let mut ctx = Context::new();

        let mut spain = kind.new_entity(persistence);
        spain.set("name", "Spain").unwrap();
        spain.save(&mut ctx).unwrap();

        let record = controller.load_last(&spain).unwrap().unwrap();
        assert_eq!(record.action, "create");
        assert_eq!(record.entity_id, spain.id());
        assert_eq!(record.request_diff.len(), 1);
        assert_eq!(record.reactive_diff["code"], Change::new(json!(null), json!(null)));
        assert!(record.description.is_none());
    }

    #[test]
    fn test_set_up_twice_registers_once() {
        let (kind, _, controller) = setup();
        assert!(!controller.set_up(&kind).unwrap());
    }

    #[test]
    fn test_no_audit_type_is_skipped() {
        let kind = EntityType::new(EntitySchema::new("cache").no_audit()).unwrap();
        let controller = Arc::new(AuditController::new(AuditSettings::default()));
        assert!(!controller.set_up(&kind).unwrap());
        assert!(kind.controller().is_none());
    }

    /// Before-save observer deriving `code` from the upper-cased name
    fn shout_code(kind: &Arc<EntityType>) {
        kind.on(HookPoint::BeforeSave, PRIORITY_DEFAULT, |entity, _, _| {
            let upper = entity.get("name")?.to_string().to_uppercase();
            entity.set("code", upper.chars().take(2).collect::<String>())
        })
        .unwrap();
    }

    #[test]
    fn test_reactive_changes_keep_existing_description() {
        let (kind, persistence, controller) = setup();
        shout_code(&kind);

        let mut ctx = Context::new();
        let mut spain = kind.new_entity(persistence);
        spain.set("name", "Spain").unwrap();
        spain.save(&mut ctx).unwrap();

        spain.set("name", "Espana").unwrap();
        spain.save(&mut ctx).unwrap();

        let record = controller.load_last(&spain).unwrap().unwrap();
        assert_eq!(record.reactive_diff["code"], Change::new("SP", "ES"));
        assert_eq!(
            record.description.as_deref(),
            Some("update Spain: name=Espana")
        );
    }

    #[test]
    fn test_reactive_changes_describe_blank_record() {
        let (kind, persistence, controller) = setup();
        shout_code(&kind);

        let mut ctx = Context::new();
        let mut spain = kind.new_entity(persistence);
        spain.set("name", "Spain").unwrap();
        spain.save(&mut ctx).unwrap();

        ctx.audit.set_custom_field("description", "").unwrap();
        spain.set("name", "Espana").unwrap();
        spain.save(&mut ctx).unwrap();

        let record = controller.load_last(&spain).unwrap().unwrap();
        assert_eq!(record.description.as_deref(), Some("(resulted in code=ES)"));
    }

    #[test]
    fn test_pull_without_push_underflows() {
        let (_, _, controller) = setup();
        let mut ctx = Context::new();
        assert!(matches!(controller.pull(&mut ctx), Err(AuditError::StackUnderflow)));
    }

    #[test]
    fn test_custom_log_requires_set_up() {
        let kind = EntityType::new(EntitySchema::new("plain")).unwrap();
        let entity = kind.new_entity(Arc::new(MemoryStore::new()));
        let mut ctx = Context::new();

        let err = custom_log(&entity, &mut ctx, "comment", Some("hello"), None).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_custom_log_default_description() {
        let (kind, persistence, _) = setup();
        let mut ctx = Context::new();

        let mut spain = kind.new_entity(persistence);
        spain.set("name", "Spain").unwrap();
        spain.save(&mut ctx).unwrap();

        let record = custom_log(&spain, &mut ctx, "audit", None, None).unwrap();
        assert_eq!(record.description.as_deref(), Some("audit Spain: "));
        assert_eq!(record.entity_id, spain.id());
    }

    #[test]
    fn test_custom_log_rejects_unknown_extra_field() {
        let (kind, persistence, controller) = setup();
        let mut ctx = Context::new();
        let spain = kind.new_entity(Arc::clone(&persistence));

        let extra = json!({"entity_type": "other"});
        let err = custom_log(&spain, &mut ctx, "comment", None, extra.as_object()).unwrap_err();
        assert!(matches!(err, AuditError::Validation(_)));
        assert!(ctx.is_idle());
        assert_eq!(controller.log_for(&spain).count(None).unwrap(), 0);
    }
}
