//! Change tracking for host entities
//!
//! # Architecture
//!
//! - [`diff`]: field-level diffs from an entity's dirty map, filtered by the
//!   resolved field policy, plus their text rendering.
//! - [`AuditRecord`]: one persisted tracked action.
//! - [`AuditLog`]: repository over the audit table, scoped by [`Jail`].
//! - [`AuditStack`]: open records and one-shot overrides of one call chain.
//! - [`AuditController`]: the hooks that tie the above to entity lifecycles.
//!
//! # Example
//!
//! ```rust,ignore
//! let controller = Arc::new(AuditController::new(AuditSettings::default()));
//! controller.set_up(&country_type)?;
//!
//! let mut ctx = Context::new();
//! let mut spain = country_type.load(persistence, 1u64)?;
//! spain.set("name", "Espana")?;
//! spain.save(&mut ctx)?;
//!
//! let last = controller.load_last(&spain)?;
//! ```

pub mod controller;
pub mod diff;
pub mod log;
pub mod record;
pub mod stack;

pub use controller::{controller_for, custom_log, AuditController, Describer};
pub use diff::{compute_diff, is_auditable, render_diff};
pub use log::{AuditLog, Jail};
pub use record::{AuditRecord, Change, Diff, OVERRIDABLE_FIELDS};
pub use stack::{AuditStack, Overrides};
