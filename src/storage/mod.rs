//! Storage layer for audit-trail
//!
//! The audit engine only needs a small key-value-with-query contract from its
//! backend: numbered rows per table, equality filters, ordering, and nested
//! transactions with all-or-nothing commit. [`Persistence`] is that contract;
//! [`MemoryStore`] implements it in memory with optional JSON file durability.

pub mod file_io;
pub mod memory;

pub use file_io::{read_json, write_json_atomic};
pub use memory::MemoryStore;

use serde_json::Value as Json;

use crate::error::AuditResult;
use crate::models::{stored_eq, FieldDef, Value};

/// A stored row: field name to stored value
pub type Row = serde_json::Map<String, Json>;

/// Pseudo-field that addresses the row key in queries
pub const ID_FIELD: &str = "id";

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Equality-filtered, ordered, limited query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub conditions: Vec<(String, Json)>,
    pub order_by: Option<(String, Order)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition; `Json::Null` matches missing fields too
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Json>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: Order) -> Self {
        self.order_by = Some((field.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check whether a row satisfies every condition
    pub fn matches(&self, id: u64, row: &Row) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            if field == ID_FIELD {
                return stored_eq(&Json::from(id), expected);
            }
            match row.get(field) {
                Some(actual) => stored_eq(actual, expected),
                None => expected.is_null(),
            }
        })
    }

    /// Sort and truncate matching rows
    pub fn arrange(&self, rows: &mut Vec<(u64, Row)>) {
        if let Some((field, order)) = &self.order_by {
            rows.sort_by(|(a_id, a), (b_id, b)| {
                let ord = if field == ID_FIELD {
                    a_id.cmp(b_id)
                } else {
                    compare_stored(a.get(field), b.get(field)).then(a_id.cmp(b_id))
                };
                match order {
                    Order::Asc => ord,
                    Order::Desc => ord.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
    }
}

fn compare_stored(a: Option<&Json>, b: Option<&Json>) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match (a, b) {
        (Some(Json::Number(x)), Some(Json::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Json::String(x)), Some(Json::String(y))) => x.cmp(y),
        (Some(Json::Bool(x)), Some(Json::Bool(y))) => x.cmp(y),
        (None | Some(Json::Null), None | Some(Json::Null)) => Ordering::Equal,
        (None | Some(Json::Null), _) => Ordering::Less,
        (_, None | Some(Json::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Backend contract consumed by host entities and the audit log
pub trait Persistence: Send + Sync {
    /// Insert a row, with an explicit id or the next free one; returns the id
    fn insert(&self, table: &str, id: Option<u64>, row: Row) -> AuditResult<u64>;

    /// Merge changed fields into an existing row
    fn update(&self, table: &str, id: u64, changes: Row) -> AuditResult<()>;

    /// Delete a row; returns whether it existed
    fn delete(&self, table: &str, id: u64) -> AuditResult<bool>;

    /// Load one row by id
    fn load(&self, table: &str, id: u64) -> AuditResult<Option<Row>>;

    /// Rows matching a query
    fn query(&self, table: &str, query: &Query) -> AuditResult<Vec<(u64, Row)>>;

    /// Number of rows matching a query
    fn count(&self, table: &str, query: &Query) -> AuditResult<usize> {
        let mut unlimited = query.clone();
        unlimited.limit = None;
        Ok(self.query(table, &unlimited)?.len())
    }

    /// Open a (possibly nested) transaction
    fn begin(&self) -> AuditResult<()>;

    /// Commit the innermost transaction
    fn commit(&self) -> AuditResult<()>;

    /// Roll back the innermost transaction
    fn rollback(&self) -> AuditResult<()>;

    /// Canonical save format of a field value
    fn typecast_save(&self, field: &FieldDef, value: &Value) -> Json {
        field.field_type.to_stored(value)
    }

    /// Inverse of [`Persistence::typecast_save`]
    fn typecast_load(&self, field: &FieldDef, stored: &Json) -> AuditResult<Value> {
        field.field_type.from_stored(stored)
    }
}

/// Run `f` inside a transaction, rolling back if it fails
pub fn atomic<T, F>(persistence: &dyn Persistence, f: F) -> AuditResult<T>
where
    F: FnOnce() -> AuditResult<T>,
{
    persistence.begin()?;

    match f() {
        Ok(value) => {
            persistence.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = persistence.rollback() {
                tracing::error!(error = %rollback_err, "rollback failed after: {}", err);
            }
            Err(err)
        }
    }
}
