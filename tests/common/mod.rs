//! Host models shared by the integration tests
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use audit_trail::audit::{AuditController, AuditLog, AuditRecord, Describer};
use audit_trail::config::AuditSettings;
use audit_trail::host::{Context, Entity, EntityRegistry, EntityType, HookPoint, PRIORITY_DEFAULT};
use audit_trail::models::{EntitySchema, FieldDef, FieldType, Value};
use audit_trail::storage::{MemoryStore, Persistence, Query};
use audit_trail::undo::{NoopUndo, UndoEngine};

pub struct World {
    pub registry: Arc<EntityRegistry>,
    pub controller: Arc<AuditController>,
    pub store: Arc<MemoryStore>,
    pub persistence: Arc<dyn Persistence>,
}

impl World {
    pub fn new() -> Self {
        Self::with_settings(AuditSettings::default())
    }

    pub fn with_settings(settings: AuditSettings) -> Self {
        Self::with_controller(AuditController::new(settings))
    }

    pub fn with_controller(controller: AuditController) -> Self {
        let store = Arc::new(MemoryStore::new());
        let persistence: Arc<dyn Persistence> = store.clone();
        Self {
            registry: Arc::new(EntityRegistry::new()),
            controller: Arc::new(controller),
            store,
            persistence,
        }
    }

    /// Register a schema and set the controller up on it
    pub fn audited(&self, schema: EntitySchema) -> Arc<EntityType> {
        let kind = self.registry.register(schema).unwrap();
        self.controller.set_up(&kind).unwrap();
        kind
    }

    pub fn log(&self) -> AuditLog {
        AuditLog::new(
            Arc::clone(&self.persistence),
            self.controller.settings().audit_table.clone(),
        )
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.log().read_all().unwrap()
    }

    pub fn last_record(&self) -> AuditRecord {
        self.records().pop().expect("no audit records")
    }

    pub fn engine(&self) -> UndoEngine {
        UndoEngine::new(
            Arc::clone(&self.registry),
            self.controller.settings().audit_table.clone(),
        )
    }

    pub fn create(&self, kind: &Arc<EntityType>, ctx: &mut Context, fields: &[(&str, Value)]) -> Entity {
        let mut entity = kind.new_entity(Arc::clone(&self.persistence));
        for (field, value) in fields {
            entity.set(field, value.clone()).unwrap();
        }
        entity.save(ctx).unwrap();
        entity
    }

    pub fn load(&self, kind: &Arc<EntityType>, id: u64) -> Entity {
        kind.load(Arc::clone(&self.persistence), id).unwrap()
    }

    pub fn dump(&self) -> serde_json::Value {
        self.store.dump().unwrap()
    }
}

pub fn country_schema() -> EntitySchema {
    EntitySchema::new("country")
        .with_title_field("name")
        .with_field(FieldDef::new("name", FieldType::String))
        .with_field(FieldDef::new("code", FieldType::Integer))
        .with_field(FieldDef::new("is_eu", FieldType::Boolean).with_default(json!(false)))
        .with_field(FieldDef::new("joined", FieldType::Date))
}

/// Spain (#1), saved through the audit hooks
pub fn spain(world: &World, ctx: &mut Context) -> (Arc<EntityType>, Entity) {
    let country = world.audited(country_schema());
    let spain = world.create(
        &country,
        ctx,
        &[("name", Value::from("Spain")), ("code", Value::from(34))],
    );
    (country, spain)
}

/// `user` whose salutation follows its gender, set by a before-save observer
pub fn gender_user(world: &World) -> Arc<EntityType> {
    let user = world.audited(
        EntitySchema::new("user")
            .with_title_field("name")
            .with_field(FieldDef::new("name", FieldType::String))
            .with_field(FieldDef::new(
                "gender",
                FieldType::Enum(vec!["M".into(), "F".into()]),
            ))
            .with_field(FieldDef::new("salutation", FieldType::String))
            .with_field(FieldDef::new("password", FieldType::String).no_audit()),
    );

    user.on(HookPoint::BeforeSave, PRIORITY_DEFAULT, |entity, _ctx, _args| {
        if !entity.is_dirty("gender") {
            return Ok(());
        }
        let salutation = match entity.get("gender")?.as_str() {
            Some("M") => Value::from("Mr"),
            Some("F") => Value::from("Ms"),
            _ => Value::Null,
        };
        entity.set("salutation", salutation)
    })
    .unwrap();

    user
}

/// `alpha -> beta -> gamma`: saving one copies `value * 10` into the next (#1)
pub fn chain(world: &World, ctx: &mut Context) -> [Arc<EntityType>; 3] {
    let schema = |name: &str| {
        EntitySchema::new(name).with_field(FieldDef::new("value", FieldType::Integer))
    };
    let alpha = world.audited(schema("alpha"));
    let beta = world.audited(schema("beta"));
    let gamma = world.audited(schema("gamma"));

    propagate(&alpha, &beta);
    propagate(&beta, &gamma);

    world.create(&gamma, ctx, &[("value", Value::from(0))]);
    world.create(&beta, ctx, &[("value", Value::from(0))]);
    world.create(&alpha, ctx, &[("value", Value::from(0))]);

    [alpha, beta, gamma]
}

fn propagate(from: &Arc<EntityType>, to: &Arc<EntityType>) {
    let to = Arc::clone(to);
    from.on(HookPoint::AfterSave, PRIORITY_DEFAULT, move |entity, ctx, _args| {
        let value = entity.get("value")?.as_i64().unwrap_or(0);
        let mut next = to.load(Arc::clone(entity.persistence()), 1u64)?;
        next.set("value", value * 10)?;
        next.save(ctx)
    })
    .unwrap();
}

/// Invoices whose total is recomputed (as action `total_adjusted`) whenever
/// one of their lines is saved or deleted
pub fn invoicing(world: &World) -> (Arc<EntityType>, Arc<EntityType>) {
    let invoice = world.audited(
        EntitySchema::new("invoice")
            .with_title_field("ref")
            .with_field(FieldDef::new("ref", FieldType::String))
            .with_field(FieldDef::new("total", FieldType::Money).with_default(json!(0.0))),
    );
    let line = world.audited(
        EntitySchema::new("line")
            .with_table("invoice_line")
            .with_title_field("item")
            .with_field(FieldDef::new("invoice_id", FieldType::Integer))
            .with_field(FieldDef::new("item", FieldType::String))
            .with_field(FieldDef::new("amount", FieldType::Money)),
    );

    for point in [HookPoint::AfterSave, HookPoint::AfterDelete] {
        let invoice = Arc::clone(&invoice);
        line.on(point, PRIORITY_DEFAULT, move |entity, ctx, _args| {
            let invoice_id = entity.get("invoice_id")?.as_i64().unwrap_or(0) as u64;
            let persistence = Arc::clone(entity.persistence());

            let total: f64 = persistence
                .query("invoice_line", &Query::new().filter("invoice_id", invoice_id))?
                .iter()
                .filter_map(|(_, row)| row.get("amount").and_then(|a| a.as_f64()))
                .sum();

            let mut parent = invoice.load(persistence, invoice_id)?;
            parent.set("total", total)?;
            ctx.audit.set_custom_action("total_adjusted");
            let saved = parent.save(ctx);
            ctx.audit.clear_overrides();
            saved
        })
        .unwrap();
    }

    (invoice, line)
}

/// Engine that treats `total_adjusted` as derived
pub fn invoicing_engine(world: &World) -> UndoEngine {
    let mut engine = world.engine();
    engine.register("total_adjusted", NoopUndo);
    engine.register("undo total_adjusted", NoopUndo);
    engine
}

/// Describes updates as `<title> changed <n> field(s)`
pub struct CountingDescriber;

impl Describer for CountingDescriber {
    fn describe(&self, entity: &Entity, record: &AuditRecord) -> Option<String> {
        if record.action != "update" {
            return None;
        }
        let title = entity.original_title().unwrap_or_default();
        Some(format!("{} changed {} field(s)", title, record.request_diff.len()))
    }
}
