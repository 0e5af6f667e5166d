//! Host entity types and entity handles
//!
//! An [`EntityType`] is a validated schema plus the hooks registered on it.
//! An [`Entity`] is one record of that type bound to a backend: it tracks
//! which fields changed since load (the dirty map, field to prior value) and
//! runs `save`/`delete` through the hook points inside a transaction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value as Json;

use super::context::Context;
use super::hooks::{HookArgs, HookFn, HookPoint, HookSet};
use crate::audit::AuditController;
use crate::error::{AuditError, AuditResult};
use crate::models::{EntityId, EntitySchema, FieldDef, FieldPolicy, Value};
use crate::storage::{atomic, Persistence, Row};

static NULL: Value = Value::Null;

/// A host entity type: schema, resolved field policies and hooks
pub struct EntityType {
    schema: EntitySchema,
    policies: BTreeMap<String, FieldPolicy>,
    hooks: RwLock<HookSet>,
    controller: RwLock<Option<Arc<AuditController>>>,
}

impl EntityType {
    /// Validate a schema and resolve its field policies
    pub fn new(schema: EntitySchema) -> AuditResult<Arc<Self>> {
        schema.validate()?;

        for field in &schema.fields {
            if let Some(default) = &field.default {
                field.field_type.from_stored(default).map_err(|e| {
                    AuditError::Validation(format!(
                        "Default of '{}.{}' is invalid: {}",
                        schema.type_id, field.name, e
                    ))
                })?;
            }
        }

        let policies = schema
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.policy()))
            .collect();

        Ok(Arc::new(Self {
            schema,
            policies,
            hooks: RwLock::new(HookSet::new()),
            controller: RwLock::new(None),
        }))
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn type_id(&self) -> &str {
        &self.schema.type_id
    }

    pub fn table(&self) -> &str {
        self.schema.table()
    }

    /// Resolved audit policy of a field; `None` for unknown fields
    pub fn policy(&self, field: &str) -> Option<FieldPolicy> {
        self.policies.get(field).copied()
    }

    /// Register a hook callback
    pub fn on<F>(&self, point: HookPoint, priority: i32, callback: F) -> AuditResult<()>
    where
        F: Fn(&mut Entity, &mut Context, &HookArgs) -> AuditResult<()> + Send + Sync + 'static,
    {
        let mut hooks = self
            .hooks
            .write()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire write lock: {}", e)))?;
        hooks.add(point, priority, Arc::new(callback));
        Ok(())
    }

    /// Register a callback that wraps every other callback at `point`
    pub fn on_outermost<F>(&self, point: HookPoint, callback: F) -> AuditResult<()>
    where
        F: Fn(&mut Entity, &mut Context, &HookArgs) -> AuditResult<()> + Send + Sync + 'static,
    {
        let mut hooks = self
            .hooks
            .write()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire write lock: {}", e)))?;
        hooks.add_outermost(point, Arc::new(callback));
        Ok(())
    }

    /// Callbacks for a hook point in dispatch order
    pub fn hooks_for(&self, point: HookPoint) -> AuditResult<Vec<HookFn>> {
        let hooks = self
            .hooks
            .read()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire read lock: {}", e)))?;
        Ok(hooks.for_point(point))
    }

    /// The audit controller set up on this type, if any
    pub fn controller(&self) -> Option<Arc<AuditController>> {
        self.controller.read().ok().and_then(|c| c.clone())
    }

    /// Attach a controller; returns false if one was already attached
    pub(crate) fn attach_controller(&self, controller: Arc<AuditController>) -> AuditResult<bool> {
        let mut slot = self
            .controller
            .write()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(controller);
        Ok(true)
    }

    /// A fresh, unsaved entity with defaults applied
    pub fn new_entity(self: &Arc<Self>, persistence: Arc<dyn Persistence>) -> Entity {
        let data = self
            .schema
            .fields
            .iter()
            .filter_map(|f| {
                let default = f.default.as_ref()?;
                let value = persistence.typecast_load(f, default).unwrap_or(Value::Null);
                Some((f.name.clone(), value))
            })
            .collect();

        Entity {
            kind: Arc::clone(self),
            persistence,
            id: None,
            data,
            dirty: BTreeMap::new(),
            only_fields: None,
        }
    }

    /// Load an existing entity
    pub fn load(
        self: &Arc<Self>,
        persistence: Arc<dyn Persistence>,
        id: impl Into<EntityId>,
    ) -> AuditResult<Entity> {
        let mut entity = self.new_entity(persistence);
        entity.load(id)?;
        Ok(entity)
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("type_id", &self.schema.type_id)
            .field("audited", &self.controller().is_some())
            .finish()
    }
}

#[derive(Clone)]
struct EntityState {
    id: Option<EntityId>,
    data: BTreeMap<String, Value>,
    dirty: BTreeMap<String, Value>,
}

/// One host record bound to a backend
pub struct Entity {
    kind: Arc<EntityType>,
    persistence: Arc<dyn Persistence>,
    id: Option<EntityId>,
    data: BTreeMap<String, Value>,
    dirty: BTreeMap<String, Value>,
    only_fields: Option<Vec<String>>,
}

impl Entity {
    pub fn kind(&self) -> &Arc<EntityType> {
        &self.kind
    }

    pub fn type_id(&self) -> &str {
        self.kind.type_id()
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    pub fn is_loaded(&self) -> bool {
        self.id.is_some()
    }

    /// Id of a loaded entity, or a configuration error
    pub fn require_id(&self) -> AuditResult<EntityId> {
        self.id.ok_or_else(|| {
            AuditError::Configuration(format!("'{}' entity is not loaded", self.type_id()))
        })
    }

    fn field_def(&self, field: &str) -> AuditResult<&FieldDef> {
        self.kind.schema().get_field(field).ok_or_else(|| {
            AuditError::Validation(format!(
                "'{}' is not a field of '{}'",
                field,
                self.type_id()
            ))
        })
    }

    /// Current value of a field (null when not loaded)
    pub fn get(&self, field: &str) -> AuditResult<&Value> {
        self.field_def(field)?;
        Ok(self.data.get(field).unwrap_or(&NULL))
    }

    /// Current value of a field in canonical stored form
    pub fn get_stored(&self, field: &str) -> AuditResult<Json> {
        let def = self.field_def(field)?;
        let value = self.data.get(field).unwrap_or(&NULL);
        Ok(self.persistence.typecast_save(def, value))
    }

    /// Assign a field, tracking it as dirty when the value actually changes
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> AuditResult<()> {
        let kind = Arc::clone(&self.kind);
        let def = kind.schema().get_field(field).ok_or_else(|| {
            AuditError::Validation(format!(
                "'{}' is not a field of '{}'",
                field,
                kind.type_id()
            ))
        })?;

        if def.read_only {
            return Err(AuditError::Validation(format!(
                "Field '{}' of '{}' is read-only",
                field,
                kind.type_id()
            )));
        }

        let value = def.field_type.normalize(value.into())?;
        self.assign(field, value);
        Ok(())
    }

    fn assign(&mut self, field: &str, value: Value) {
        let current = self.data.get(field).unwrap_or(&NULL);
        if *current == value {
            return;
        }

        match self.dirty.get(field) {
            Some(prior) if *prior == value => {
                self.dirty.remove(field);
            }
            Some(_) => {}
            None => {
                self.dirty.insert(field.to_string(), current.clone());
            }
        }

        self.data.insert(field.to_string(), value);
    }

    /// All current field values
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    /// Changed fields and their values as loaded
    pub fn dirty(&self) -> &BTreeMap<String, Value> {
        &self.dirty
    }

    /// Value of a dirty field as loaded
    pub fn prior(&self, field: &str) -> Option<&Value> {
        self.dirty.get(field)
    }

    pub fn is_dirty(&self, field: &str) -> bool {
        self.dirty.contains_key(field)
    }

    pub fn has_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Current value of the title field
    pub fn title(&self) -> Option<String> {
        let field = self.kind.schema().title_field()?;
        let value = self.data.get(field)?;
        (!value.is_null()).then(|| value.to_string())
    }

    /// Title field value as loaded, ignoring unsaved changes
    pub fn original_title(&self) -> Option<String> {
        let field = self.kind.schema().title_field()?;
        let value = self.dirty.get(field).or_else(|| self.data.get(field))?;
        (!value.is_null()).then(|| value.to_string())
    }

    /// Restrict the fields read by the next load
    pub fn only_fields(&mut self, fields: &[&str]) -> AuditResult<()> {
        for field in fields {
            self.field_def(field)?;
        }
        self.only_fields = Some(fields.iter().map(|f| f.to_string()).collect());
        Ok(())
    }

    pub fn projection(&self) -> Option<&[String]> {
        self.only_fields.as_deref()
    }

    pub fn clear_projection(&mut self) {
        self.only_fields = None;
    }

    fn in_projection(&self, field: &str) -> bool {
        self.only_fields
            .as_ref()
            .map_or(true, |only| only.iter().any(|f| f == field))
    }

    /// Load a record; `Ok(false)` when it doesn't exist
    pub fn try_load(&mut self, id: impl Into<EntityId>) -> AuditResult<bool> {
        let id = id.into();
        let row = match self.persistence.load(self.kind.table(), id.get())? {
            Some(row) => row,
            None => return Ok(false),
        };

        let mut data = BTreeMap::new();
        for def in &self.kind.schema().fields {
            if !def.is_loaded() || !self.in_projection(&def.name) {
                continue;
            }
            let stored = row.get(&def.name).unwrap_or(&Json::Null);
            data.insert(def.name.clone(), self.persistence.typecast_load(def, stored)?);
        }

        self.id = Some(id);
        self.data = data;
        self.dirty.clear();
        Ok(true)
    }

    /// Load a record that must exist
    pub fn load(&mut self, id: impl Into<EntityId>) -> AuditResult<()> {
        let id = id.into();
        if self.try_load(id)? {
            Ok(())
        } else {
            Err(AuditError::entity_not_found(self.type_id(), id))
        }
    }

    /// Re-read the current record, discarding unsaved changes
    pub fn reload(&mut self) -> AuditResult<()> {
        let id = self.require_id()?;
        self.load(id)
    }

    /// Forget the loaded record
    pub fn unload(&mut self) {
        self.id = None;
        self.data.clear();
        self.dirty.clear();
    }

    fn state(&self) -> EntityState {
        EntityState {
            id: self.id,
            data: self.data.clone(),
            dirty: self.dirty.clone(),
        }
    }

    fn restore(&mut self, state: EntityState) {
        self.id = state.id;
        self.data = state.data;
        self.dirty = state.dirty;
    }

    fn dispatch(&mut self, point: HookPoint, ctx: &mut Context, args: &HookArgs) -> AuditResult<()> {
        for callback in self.kind.hooks_for(point)? {
            callback(self, ctx, args)?;
        }
        Ok(())
    }

    /// Insert or update the record inside a transaction
    ///
    /// On failure the backend is rolled back, this entity is restored to its
    /// pre-save state and any audit records opened during the save are
    /// dropped from the context.
    pub fn save(&mut self, ctx: &mut Context) -> AuditResult<()> {
        let state = self.state();
        let depth = ctx.audit.depth();
        let persistence = Arc::clone(&self.persistence);

        let result = atomic(persistence.as_ref(), || self.save_in_transaction(ctx));

        if result.is_err() {
            self.restore(state);
            ctx.audit.unwind(depth);
        }
        result
    }

    fn save_in_transaction(&mut self, ctx: &mut Context) -> AuditResult<()> {
        let args = HookArgs::Save {
            is_update: self.id.is_some(),
        };

        self.dispatch(HookPoint::BeforeSave, ctx, &args)?;

        match self.id {
            Some(id) => self.write_update(id)?,
            None => self.write_insert()?,
        }

        self.dispatch(HookPoint::AfterSave, ctx, &args)?;
        self.dirty.clear();
        Ok(())
    }

    fn write_update(&self, id: EntityId) -> AuditResult<()> {
        let mut row = Row::new();
        for field in self.dirty.keys() {
            let def = self.field_def(field)?;
            if def.is_saved() {
                let value = self.data.get(field).unwrap_or(&NULL);
                row.insert(field.clone(), self.persistence.typecast_save(def, value));
            }
        }

        if row.is_empty() {
            return Ok(());
        }
        self.persistence.update(self.kind.table(), id.get(), row)
    }

    fn write_insert(&mut self) -> AuditResult<()> {
        let mut row = Row::new();
        for def in &self.kind.schema().fields {
            if !def.is_saved() {
                continue;
            }
            let value = self.data.get(&def.name).unwrap_or(&NULL);
            let stored = match (value, &def.default) {
                (Value::Null, Some(default)) => default.clone(),
                _ => self.persistence.typecast_save(def, value),
            };
            row.insert(def.name.clone(), stored);
        }

        let id = self.persistence.insert(self.kind.table(), None, row)?;
        self.id = Some(EntityId::new(id));
        Ok(())
    }

    /// Insert this entity's fields under an explicit id
    ///
    /// Used to re-create a deleted record with its original identity; runs
    /// the save hooks like a normal create.
    pub fn save_as(&mut self, ctx: &mut Context, id: EntityId) -> AuditResult<()> {
        if self.id.is_some() {
            return Err(AuditError::Configuration(format!(
                "'{}' entity is already loaded as #{}",
                self.type_id(),
                self.require_id()?
            )));
        }

        let state = self.state();
        let depth = ctx.audit.depth();
        let persistence = Arc::clone(&self.persistence);

        let result = atomic(persistence.as_ref(), || {
            let args = HookArgs::Save { is_update: false };
            self.dispatch(HookPoint::BeforeSave, ctx, &args)?;

            let mut row = Row::new();
            for def in &self.kind.schema().fields {
                if def.is_saved() {
                    let value = self.data.get(&def.name).unwrap_or(&NULL);
                    row.insert(def.name.clone(), self.persistence.typecast_save(def, value));
                }
            }
            self.persistence.insert(self.kind.table(), Some(id.get()), row)?;
            self.id = Some(id);

            self.dispatch(HookPoint::AfterSave, ctx, &args)?;
            self.dirty.clear();
            Ok(())
        });

        if result.is_err() {
            self.restore(state);
            ctx.audit.unwind(depth);
        }
        result
    }

    /// Delete the loaded record inside a transaction
    pub fn delete(&mut self, ctx: &mut Context) -> AuditResult<()> {
        let id = self.require_id()?;
        let state = self.state();
        let depth = ctx.audit.depth();
        let persistence = Arc::clone(&self.persistence);

        let result = atomic(persistence.as_ref(), || {
            let args = HookArgs::Delete { id };
            self.dispatch(HookPoint::BeforeDelete, ctx, &args)?;

            if !self.persistence.delete(self.kind.table(), id.get())? {
                return Err(AuditError::entity_not_found(self.type_id(), id));
            }

            self.dispatch(HookPoint::AfterDelete, ctx, &args)
        });

        match result {
            Ok(()) => {
                self.unload();
                Ok(())
            }
            Err(err) => {
                self.restore(state);
                ctx.audit.unwind(depth);
                Err(err)
            }
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type_id", &self.type_id())
            .field("id", &self.id)
            .field("data", &self.data)
            .field("dirty", &self.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::hooks::PRIORITY_DEFAULT;
    use crate::models::FieldType;
    use crate::storage::{MemoryStore, Query};
    use serde_json::json;

    fn country_type() -> Arc<EntityType> {
        EntityType::new(
            EntitySchema::new("country")
                .with_title_field("name")
                .with_field(FieldDef::new("name", FieldType::String))
                .with_field(FieldDef::new("code", FieldType::String))
                .with_field(FieldDef::new("population", FieldType::Integer).with_default(json!(0)))
                .with_field(FieldDef::new("created", FieldType::Date).read_only())
                .with_field(FieldDef::new("cache", FieldType::String).never_persist()),
        )
        .unwrap()
    }

    fn store() -> Arc<dyn Persistence> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn test_new_entity_applies_defaults() {
        let entity = country_type().new_entity(store());
        assert_eq!(entity.get("population").unwrap(), &Value::Integer(0));
        assert_eq!(entity.get("name").unwrap(), &Value::Null);
        assert!(!entity.has_changes());
        assert!(entity.get("nope").is_err());
    }

    #[test]
    fn test_dirty_tracking() {
        let mut entity = country_type().new_entity(store());
        entity.set("name", "Spain").unwrap();
        assert_eq!(entity.prior("name"), Some(&Value::Null));

        entity.set("name", "Espana").unwrap();
        assert_eq!(entity.prior("name"), Some(&Value::Null));

        entity.set("name", Value::Null).unwrap();
        assert!(!entity.is_dirty("name"));

        entity.set("population", 0).unwrap();
        assert!(!entity.is_dirty("population"));
    }

    #[test]
    fn test_read_only_field_cannot_be_set() {
        let mut entity = country_type().new_entity(store());
        let err = entity.set("created", "2020-01-01").unwrap_err();
        assert!(matches!(err, AuditError::Validation(_)));
    }

    #[test]
    fn test_save_insert_then_update() {
        let persistence = store();
        let kind = country_type();
        let mut ctx = Context::new();

        let mut entity = kind.new_entity(Arc::clone(&persistence));
        entity.set("name", "Spain").unwrap();
        entity.set("cache", "transient").unwrap();
        entity.save(&mut ctx).unwrap();

        let id = entity.require_id().unwrap();
        let row = persistence.load("country", id.get()).unwrap().unwrap();
        assert_eq!(row["name"], json!("Spain"));
        assert_eq!(row["population"], json!(0));
        assert!(!row.contains_key("cache"));
        assert!(!row.contains_key("created"));

        entity.set("name", "Espana").unwrap();
        entity.save(&mut ctx).unwrap();
        assert!(!entity.has_changes());

        let reloaded = kind.load(persistence, id).unwrap();
        assert_eq!(reloaded.get("name").unwrap(), &Value::from("Espana"));
        assert_eq!(reloaded.title().as_deref(), Some("Espana"));
    }

    #[test]
    fn test_original_title_uses_loaded_value() {
        let persistence = store();
        let kind = country_type();
        let mut ctx = Context::new();

        let mut entity = kind.new_entity(Arc::clone(&persistence));
        entity.set("name", "Spain").unwrap();
        entity.save(&mut ctx).unwrap();

        entity.set("name", "Espana").unwrap();
        assert_eq!(entity.title().as_deref(), Some("Espana"));
        assert_eq!(entity.original_title().as_deref(), Some("Spain"));
    }

    #[test]
    fn test_projection_limits_loaded_fields() {
        let persistence = store();
        let kind = country_type();
        let mut ctx = Context::new();

        let mut entity = kind.new_entity(Arc::clone(&persistence));
        entity.set("name", "Spain").unwrap();
        entity.set("code", "ES").unwrap();
        entity.save(&mut ctx).unwrap();
        let id = entity.require_id().unwrap();

        let mut partial = kind.new_entity(persistence);
        partial.only_fields(&["name"]).unwrap();
        partial.load(id).unwrap();
        assert_eq!(partial.get("code").unwrap(), &Value::Null);

        partial.clear_projection();
        partial.reload().unwrap();
        assert_eq!(partial.get("code").unwrap(), &Value::from("ES"));
    }

    #[test]
    fn test_failed_save_rolls_back_and_restores() {
        let persistence = store();
        let kind = country_type();
        kind.on(HookPoint::AfterSave, PRIORITY_DEFAULT, |entity, _, _| {
            if entity.get("name")?.as_str() == Some("Atlantis") {
                return Err(AuditError::Validation("no such country".into()));
            }
            Ok(())
        })
        .unwrap();

        let mut ctx = Context::new();
        let mut entity = kind.new_entity(Arc::clone(&persistence));
        entity.set("name", "Atlantis").unwrap();

        assert!(entity.save(&mut ctx).is_err());
        assert!(!entity.is_loaded());
        assert!(entity.is_dirty("name"));
        assert_eq!(persistence.count("country", &Query::new()).unwrap(), 0);
    }

    #[test]
    fn test_delete_unloads() {
        let persistence = store();
        let kind = country_type();
        let mut ctx = Context::new();

        let mut entity = kind.new_entity(Arc::clone(&persistence));
        entity.set("name", "Spain").unwrap();
        entity.save(&mut ctx).unwrap();
        let id = entity.require_id().unwrap();

        entity.delete(&mut ctx).unwrap();
        assert!(!entity.is_loaded());
        assert!(kind.load(persistence, id).unwrap_err().is_not_found());
        assert!(entity.delete(&mut ctx).unwrap_err().is_configuration());
    }

    #[test]
    fn test_save_as_reuses_id() {
        let persistence = store();
        let kind = country_type();
        let mut ctx = Context::new();

        let mut entity = kind.new_entity(Arc::clone(&persistence));
        entity.set("name", "Spain").unwrap();
        entity.save_as(&mut ctx, EntityId::new(42)).unwrap();

        assert_eq!(entity.id(), Some(EntityId::new(42)));
        assert!(persistence.load("country", 42).unwrap().is_some());
    }

    #[test]
    fn test_invalid_default_is_rejected() {
        let schema = EntitySchema::new("bad")
            .with_field(FieldDef::new("when", FieldType::Date).with_default(json!("yesterday")));
        assert!(EntityType::new(schema).is_err());
    }
}
