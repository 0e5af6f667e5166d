//! Call-scoped mutation context
//!
//! Threaded through `save`/`delete` and every hook so that nested operations
//! see the audit records opened by their callers, and nothing else.

use crate::audit::AuditStack;

#[derive(Debug, Default)]
pub struct Context {
    pub audit: AuditStack,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no audited operation is in flight and no override is pending
    pub fn is_idle(&self) -> bool {
        self.audit.is_empty() && self.audit.overrides().is_empty()
    }
}
