//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the audit engine.

pub mod entity;
pub mod export;
pub mod history;
pub mod undo;
pub mod workspace;

pub use entity::{
    handle_comment_command, handle_create_command, handle_delete_command, handle_set_command,
};
pub use export::{handle_export_command, ExportFormat};
pub use history::{handle_history_command, handle_show_command};
pub use undo::handle_undo_command;
pub use workspace::Workspace;
