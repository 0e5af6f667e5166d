//! Core data models for audit-trail
//!
//! This module contains the typed ids, the host value type with its canonical
//! stored form, and the schema descriptors host entities are built from.

pub mod ids;
pub mod schema;
pub mod value;

pub use ids::{AuditRecordId, EntityId};
pub use schema::{EntitySchema, FieldDef, FieldPolicy, FieldType};
pub use value::{render_raw, stored_eq, Rendered, Value};
