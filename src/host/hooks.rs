//! Lifecycle hook points
//!
//! Callbacks run in ascending priority order; callbacks registered with the
//! same priority run in registration order. Outermost callbacks wrap all
//! others: on a `before` point they run first, on an `after` point last,
//! regardless of ties at the extreme priorities.

use std::fmt;
use std::sync::Arc;

use super::context::Context;
use super::entity::Entity;
use crate::error::AuditResult;
use crate::models::EntityId;

/// Runs before every other callback at a hook point
pub const PRIORITY_FIRST: i32 = i32::MIN;

/// Runs after every other callback at a hook point
pub const PRIORITY_LAST: i32 = i32::MAX;

/// Default priority for ordinary observers
pub const PRIORITY_DEFAULT: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeSave,
    AfterSave,
    BeforeDelete,
    AfterDelete,
}

impl HookPoint {
    pub fn is_before(&self) -> bool {
        matches!(self, HookPoint::BeforeSave | HookPoint::BeforeDelete)
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPoint::BeforeSave => write!(f, "before-save"),
            HookPoint::AfterSave => write!(f, "after-save"),
            HookPoint::BeforeDelete => write!(f, "before-delete"),
            HookPoint::AfterDelete => write!(f, "after-delete"),
        }
    }
}

/// Arguments passed to a hook callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookArgs {
    Save { is_update: bool },
    Delete { id: EntityId },
}

pub type HookFn = Arc<dyn Fn(&mut Entity, &mut Context, &HookArgs) -> AuditResult<()> + Send + Sync>;

struct Hook {
    point: HookPoint,
    priority: i32,
    /// Tie-break among equal priorities; outermost hooks are -1 or 1
    rank: i8,
    callback: HookFn,
}

/// Callbacks registered on one entity type
#[derive(Default)]
pub struct HookSet {
    hooks: Vec<Hook>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, point: HookPoint, priority: i32, callback: HookFn) {
        self.hooks.push(Hook {
            point,
            priority,
            rank: 0,
            callback,
        });
    }

    /// Add a callback that wraps every other callback at `point`
    pub fn add_outermost(&mut self, point: HookPoint, callback: HookFn) {
        let (priority, rank) = if point.is_before() {
            (PRIORITY_FIRST, -1)
        } else {
            (PRIORITY_LAST, 1)
        };
        self.hooks.push(Hook {
            point,
            priority,
            rank,
            callback,
        });
    }

    /// Callbacks for a hook point in dispatch order
    pub fn for_point(&self, point: HookPoint) -> Vec<HookFn> {
        let mut matching: Vec<&Hook> = self.hooks.iter().filter(|h| h.point == point).collect();
        // Stable sort keeps registration order among equal priorities
        matching.sort_by_key(|h| (h.priority, h.rank));
        matching.into_iter().map(|h| Arc::clone(&h.callback)).collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
