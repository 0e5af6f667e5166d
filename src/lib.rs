//! audit-trail - field-level change tracking and transactional undo
//!
//! This library records every create, update and delete of a host entity as
//! an audit record holding field-level diffs, nests records caused by other
//! records, and reverses any record (with everything it caused) inside one
//! transaction.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `models`: Typed ids, field values and entity schemas
//! - `storage`: Persistence contract and the JSON-file backend
//! - `host`: Host entities, their lifecycle hooks and the type registry
//! - `audit`: Diff engine, audit records, audit stack and controller
//! - `undo`: Undo engine and per-action handlers
//! - `display`, `export`, `cli`: command-line surface
//!
//! # Example
//!
//! ```rust,ignore
//! use audit_trail::prelude::*;
//!
//! let registry = EntityRegistry::new();
//! let country = registry.register(
//!     EntitySchema::new("country")
//!         .with_title_field("name")
//!         .with_field(FieldDef::new("name", FieldType::String)),
//! )?;
//! Arc::new(AuditController::new(AuditSettings::default())).set_up(&country)?;
//!
//! let mut ctx = Context::new();
//! let mut spain = country.new_entity(Arc::new(MemoryStore::new()));
//! spain.set("name", "Spain")?;
//! spain.save(&mut ctx)?;
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod export;
pub mod host;
pub mod models;
pub mod storage;
pub mod undo;

pub use error::{AuditError, AuditResult};

/// Commonly used types
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::audit::{
        controller_for, custom_log, AuditController, AuditLog, AuditRecord, Change, Describer,
        Diff, Jail,
    };
    pub use crate::config::{AuditPaths, AuditSettings};
    pub use crate::error::{AuditError, AuditResult};
    pub use crate::host::{Context, Entity, EntityRegistry, EntityType, HookArgs, HookPoint};
    pub use crate::models::{AuditRecordId, EntityId, EntitySchema, FieldDef, FieldType, Value};
    pub use crate::storage::{MemoryStore, Persistence};
    pub use crate::undo::{NoopUndo, UndoEngine, UndoHandler, UndoTarget};
}
