//! Host-entity contract
//!
//! The audit engine observes host records through four hook points with
//! numeric priorities, a dirty map on each entity, and a call-scoped
//! [`Context`] carried through every mutation.

pub mod context;
pub mod entity;
pub mod hooks;
pub mod registry;

pub use context::Context;
pub use entity::{Entity, EntityType};
pub use hooks::{HookArgs, HookFn, HookPoint, PRIORITY_DEFAULT, PRIORITY_FIRST, PRIORITY_LAST};
pub use registry::{load_schemas, EntityRegistry};
