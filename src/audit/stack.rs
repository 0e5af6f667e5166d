//! Audit stack
//!
//! LIFO of records pushed but not yet pulled, plus the one-shot overrides
//! applied to the next push or pull. It lives on the call-scoped
//! [`Context`](crate::host::Context), so independent mutation chains each
//! carry their own.

use std::time::{Duration, Instant};

use serde_json::{Map, Value as Json};

use super::record::AuditRecord;
use crate::error::{AuditError, AuditResult};
use crate::models::AuditRecordId;

/// A pushed record and when it was pushed
#[derive(Debug)]
struct OpenFrame {
    record: AuditRecord,
    started: Instant,
}

/// Pending one-shot overrides, taken as a unit
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Overrides {
    pub action: Option<String>,
    pub fields: Map<String, Json>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self.action.is_none() && self.fields.is_empty()
    }

    /// Apply to a record: action first, then extra fields
    pub fn apply(&self, record: &mut AuditRecord) -> AuditResult<()> {
        if let Some(action) = &self.action {
            record.action = action.clone();
        }
        record.apply_fields(&self.fields)
    }
}

/// Records opened by push and not yet pulled, innermost last
///
/// Also holds the one-shot overrides for the next record.
#[derive(Debug, Default)]
pub struct AuditStack {
    frames: Vec<OpenFrame>,
    overrides: Overrides,
}

impl AuditStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open records
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Id of the innermost open record: the initiator of the next push
    pub fn top_id(&self) -> Option<AuditRecordId> {
        self.frames.last().and_then(|f| f.record.id)
    }

    pub fn top(&self) -> Option<&AuditRecord> {
        self.frames.last().map(|f| &f.record)
    }

    pub fn top_mut(&mut self) -> AuditResult<&mut AuditRecord> {
        self.frames
            .last_mut()
            .map(|f| &mut f.record)
            .ok_or(AuditError::StackUnderflow)
    }

    /// Open a record and start its timer
    pub fn push(&mut self, record: AuditRecord) {
        self.frames.push(OpenFrame {
            record,
            started: Instant::now(),
        });
    }

    /// Close the innermost record, returning it with its elapsed time
    pub fn pop(&mut self) -> AuditResult<(AuditRecord, Duration)> {
        let frame = self.frames.pop().ok_or_else(|| {
            tracing::error!("audit stack underflow");
            AuditError::StackUnderflow
        })?;

        Ok((frame.record, frame.started.elapsed()))
    }

    /// Drop frames above `depth`, used when a mutation fails mid-flight
    pub fn unwind(&mut self, depth: usize) {
        if self.frames.len() > depth {
            tracing::debug!(
                dropped = self.frames.len() - depth,
                "unwinding audit stack"
            );
            self.frames.truncate(depth);
        }
    }

    /// Override the action of the next pushed or pulled record
    pub fn set_custom_action(&mut self, action: impl Into<String>) {
        self.overrides.action = Some(action.into());
    }

    /// Set a field on the next pushed or pulled record
    pub fn set_custom_field(&mut self, key: impl Into<String>, value: impl Into<Json>) -> AuditResult<()> {
        let key = key.into();
        AuditRecord::check_field(&key)?;
        self.overrides.fields.insert(key, value.into());
        Ok(())
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    /// Consume pending overrides
    pub fn take_overrides(&mut self) -> Overrides {
        std::mem::take(&mut self.overrides)
    }

    pub fn clear_overrides(&mut self) {
        self.overrides = Overrides::default();
    }
}
