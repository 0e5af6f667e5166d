//! Audit log repository
//!
//! Reads and writes [`AuditRecord`]s in the audit table of a backend. A
//! [`Jail`] scopes queries to one entity's own trail.

use std::sync::Arc;

use crate::error::{AuditError, AuditResult};
use crate::host::Entity;
use crate::models::{AuditRecordId, EntityId};
use crate::storage::{Order, Persistence, Query, ID_FIELD};

use super::record::AuditRecord;

/// Query scope: one entity type, optionally one instance of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jail {
    pub entity_type: String,
    pub entity_id: Option<EntityId>,
}

impl Jail {
    /// The trail of one entity instance
    pub fn entity(entity_type: impl Into<String>, entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: Some(entity_id.into()),
        }
    }

    /// The trail of every instance of a type
    pub fn entity_type(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: None,
        }
    }

    /// The trail of a loaded entity, or of its whole type when unloaded
    pub fn of(entity: &Entity) -> Self {
        Self {
            entity_type: entity.type_id().to_string(),
            entity_id: entity.id(),
        }
    }

    fn apply(&self, query: Query) -> Query {
        let query = query.filter("entity_type", self.entity_type.as_str());
        match self.entity_id {
            Some(id) => query.filter("entity_id", id.get()),
            None => query,
        }
    }
}

/// Repository for audit records in one backend table
#[derive(Clone)]
pub struct AuditLog {
    persistence: Arc<dyn Persistence>,
    table: String,
}

impl AuditLog {
    pub fn new(persistence: Arc<dyn Persistence>, table: impl Into<String>) -> Self {
        Self {
            persistence,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// Persist a new record and assign its id
    pub fn insert(&self, record: &mut AuditRecord) -> AuditResult<AuditRecordId> {
        if let Some(id) = record.id {
            return Err(AuditError::Storage(format!(
                "Audit record {} is already persisted",
                id
            )));
        }

        let id = AuditRecordId::new(self.persistence.insert(&self.table, None, record.to_row()?)?);
        record.id = Some(id);
        Ok(id)
    }

    /// Write every field of a persisted record
    pub fn update(&self, record: &AuditRecord) -> AuditResult<()> {
        let id = record.require_id()?;
        self.persistence
            .update(&self.table, id.get(), record.to_row()?)
            .map_err(|e| match e {
                AuditError::NotFound { .. } => AuditError::record_not_found(id),
                other => other,
            })
    }

    /// Insert or update depending on whether the record has an id
    pub fn save(&self, record: &mut AuditRecord) -> AuditResult<AuditRecordId> {
        match record.id {
            Some(id) => {
                self.update(record)?;
                Ok(id)
            }
            None => self.insert(record),
        }
    }

    pub fn delete(&self, id: AuditRecordId) -> AuditResult<bool> {
        self.persistence.delete(&self.table, id.get())
    }

    pub fn try_load(&self, id: AuditRecordId) -> AuditResult<Option<AuditRecord>> {
        self.persistence
            .load(&self.table, id.get())?
            .map(|row| AuditRecord::from_row(id.get(), row))
            .transpose()
    }

    pub fn load(&self, id: AuditRecordId) -> AuditResult<AuditRecord> {
        self.try_load(id)?
            .ok_or_else(|| AuditError::record_not_found(id))
    }

    /// Most recent record in a jail
    pub fn load_last(&self, jail: &Jail) -> AuditResult<Option<AuditRecord>> {
        let query = jail.apply(Query::new()).order_by(ID_FIELD, Order::Desc).limit(1);
        Ok(self.run(&query)?.into_iter().next())
    }

    /// Records newest first, optionally jailed and limited
    pub fn query(&self, jail: Option<&Jail>, limit: Option<usize>) -> AuditResult<Vec<AuditRecord>> {
        let mut query = Query::new().order_by(ID_FIELD, Order::Desc);
        if let Some(jail) = jail {
            query = jail.apply(query);
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        self.run(&query)
    }

    /// Every record, oldest first
    pub fn read_all(&self) -> AuditResult<Vec<AuditRecord>> {
        self.run(&Query::new().order_by(ID_FIELD, Order::Asc))
    }

    /// The most recent `count` records within a jail, oldest first
    pub fn read_recent(&self, jail: Option<&Jail>, count: usize) -> AuditResult<Vec<AuditRecord>> {
        let mut records = self.query(jail, Some(count))?;
        records.reverse();
        Ok(records)
    }

    pub fn count(&self, jail: Option<&Jail>) -> AuditResult<usize> {
        let query = match jail {
            Some(jail) => jail.apply(Query::new()),
            None => Query::new(),
        };
        self.persistence.count(&self.table, &query)
    }

    /// Records directly initiated by `id`, oldest first
    pub fn children(&self, id: AuditRecordId) -> AuditResult<Vec<AuditRecord>> {
        let query = Query::new()
            .filter("initiator_record_id", id.get())
            .order_by(ID_FIELD, Order::Asc);
        self.run(&query)
    }

    /// Every record transitively initiated by `id`, excluding `id` itself
    pub fn subtree(&self, id: AuditRecordId) -> AuditResult<Vec<AuditRecord>> {
        let mut found = Vec::new();
        let mut pending = vec![id];

        while let Some(parent) = pending.pop() {
            for child in self.children(parent)? {
                pending.push(child.require_id()?);
                found.push(child);
            }
        }

        found.sort_by_key(|r| r.id);
        Ok(found)
    }

    fn run(&self, query: &Query) -> AuditResult<Vec<AuditRecord>> {
        self.persistence
            .query(&self.table, query)?
            .into_iter()
            .map(|(id, row)| AuditRecord::from_row(id, row))
            .collect()
    }
}
