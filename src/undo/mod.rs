//! Undo engine and action handlers

pub mod engine;
pub mod handlers;

pub use engine::UndoEngine;
pub use handlers::{
    default_handlers, NoopUndo, RemoveCreate, RestoreDelete, RevertUpdate, UndoHandler, UndoTarget,
};
