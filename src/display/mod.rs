//! Display formatting for terminal output

pub mod history;

pub use history::{format_changes, format_history, format_record_details, format_record_line};
