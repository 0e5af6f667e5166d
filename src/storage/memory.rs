//! In-memory backend with optional JSON file durability
//!
//! Transactions are savepoints: `begin` snapshots the whole store, `rollback`
//! restores the innermost snapshot, `commit` discards it. When a file path is
//! configured the store is written out whenever no transaction is open.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};

use super::file_io::{read_json, write_json_atomic};
use super::{Persistence, Query, Row};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Table {
    /// Highest id handed out so far
    #[serde(default)]
    last_id: u64,
    #[serde(default)]
    rows: BTreeMap<u64, Row>,
}

/// Serializable store contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    tables: BTreeMap<String, Table>,
}

/// Backend keeping all tables in memory
pub struct MemoryStore {
    path: Option<PathBuf>,
    data: RwLock<StoreData>,
    savepoints: Mutex<Vec<StoreData>>,
}

impl MemoryStore {
    /// Create an empty, purely in-memory store
    pub fn new() -> Self {
        Self {
            path: None,
            data: RwLock::new(StoreData::default()),
            savepoints: Mutex::new(Vec::new()),
        }
    }

    /// Open a file-backed store, loading existing contents if present
    pub fn open(path: PathBuf) -> AuditResult<Self> {
        let data: StoreData = read_json(&path)?;
        tracing::debug!(path = %path.display(), tables = data.tables.len(), "opened store");

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
            savepoints: Mutex::new(Vec::new()),
        })
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// Names of all tables that have ever held a row
    pub fn tables(&self) -> AuditResult<Vec<String>> {
        let data = self.read()?;
        Ok(data.tables.keys().cloned().collect())
    }

    /// Whole store contents as JSON, for inspection and comparison
    pub fn dump(&self) -> AuditResult<serde_json::Value> {
        let data = self.read()?;
        Ok(serde_json::to_value(&*data)?)
    }

    /// Current transaction nesting depth
    pub fn depth(&self) -> AuditResult<usize> {
        Ok(self.savepoints()?.len())
    }

    /// Write the store to its file now
    pub fn save(&self) -> AuditResult<()> {
        match &self.path {
            Some(path) => {
                let data = self.read()?;
                write_json_atomic(path, &*data)
            }
            None => Ok(()),
        }
    }

    fn read(&self) -> AuditResult<std::sync::RwLockReadGuard<'_, StoreData>> {
        self.data
            .read()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> AuditResult<std::sync::RwLockWriteGuard<'_, StoreData>> {
        self.data
            .write()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire write lock: {}", e)))
    }

    fn savepoints(&self) -> AuditResult<std::sync::MutexGuard<'_, Vec<StoreData>>> {
        self.savepoints
            .lock()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire savepoint lock: {}", e)))
    }

    /// Flush to disk unless a transaction is still open
    fn flush_if_idle(&self) -> AuditResult<()> {
        if self.path.is_some() && self.savepoints()?.is_empty() {
            self.save()?;
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Persistence for MemoryStore {
    fn insert(&self, table: &str, id: Option<u64>, row: Row) -> AuditResult<u64> {
        let id = {
            let mut data = self.write()?;
            let table_data = data.tables.entry(table.to_string()).or_default();

            let id = match id {
                Some(id) if table_data.rows.contains_key(&id) => {
                    return Err(AuditError::Storage(format!(
                        "Row {} already exists in '{}'",
                        id, table
                    )));
                }
                Some(id) => id,
                None => table_data.last_id + 1,
            };

            table_data.last_id = table_data.last_id.max(id);
            table_data.rows.insert(id, row);
            id
        };

        self.flush_if_idle()?;
        Ok(id)
    }

    fn update(&self, table: &str, id: u64, changes: Row) -> AuditResult<()> {
        {
            let mut data = self.write()?;
            let row = data
                .tables
                .get_mut(table)
                .and_then(|t| t.rows.get_mut(&id))
                .ok_or_else(|| AuditError::entity_not_found(table, id))?;

            for (field, value) in changes {
                row.insert(field, value);
            }
        }

        self.flush_if_idle()
    }

    fn delete(&self, table: &str, id: u64) -> AuditResult<bool> {
        let existed = {
            let mut data = self.write()?;
            data.tables
                .get_mut(table)
                .map(|t| t.rows.remove(&id).is_some())
                .unwrap_or(false)
        };

        if existed {
            self.flush_if_idle()?;
        }
        Ok(existed)
    }

    fn load(&self, table: &str, id: u64) -> AuditResult<Option<Row>> {
        let data = self.read()?;
        Ok(data
            .tables
            .get(table)
            .and_then(|t| t.rows.get(&id))
            .cloned())
    }

    fn query(&self, table: &str, query: &Query) -> AuditResult<Vec<(u64, Row)>> {
        let data = self.read()?;

        let mut rows: Vec<(u64, Row)> = match data.tables.get(table) {
            Some(t) => t
                .rows
                .iter()
                .filter(|(id, row)| query.matches(**id, row))
                .map(|(id, row)| (*id, row.clone()))
                .collect(),
            None => Vec::new(),
        };

        query.arrange(&mut rows);
        Ok(rows)
    }

    fn begin(&self) -> AuditResult<()> {
        let snapshot = self.read()?.clone();
        self.savepoints()?.push(snapshot);
        Ok(())
    }

    fn commit(&self) -> AuditResult<()> {
        let remaining = {
            let mut savepoints = self.savepoints()?;
            savepoints
                .pop()
                .ok_or_else(|| AuditError::Storage("commit without an open transaction".into()))?;
            savepoints.len()
        };

        if remaining == 0 {
            self.save()?;
        }
        Ok(())
    }

    fn rollback(&self) -> AuditResult<()> {
        let snapshot = self
            .savepoints()?
            .pop()
            .ok_or_else(|| AuditError::Storage("rollback without an open transaction".into()))?;

        *self.write()? = snapshot;
        tracing::debug!("rolled back transaction");
        Ok(())
    }
}
