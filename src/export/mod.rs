//! Audit trail export
//!
//! - CSV: one row per record, spreadsheet-compatible
//! - JSON: versioned, machine-readable
//! - YAML: versioned, human-readable

pub mod csv;
pub mod json;
pub mod yaml;

pub use self::csv::export_trail_csv;
pub use json::{export_trail_json, import_trail_json, TrailExport, EXPORT_SCHEMA_VERSION};
pub use yaml::{export_trail_yaml, import_trail_yaml};
