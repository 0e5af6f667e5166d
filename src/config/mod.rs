//! Configuration module for audit-trail
//!
//! This module provides configuration management including:
//! - XDG-compliant path resolution for the data directory
//! - Persisted audit settings

pub mod paths;
pub mod settings;

pub use paths::AuditPaths;
pub use settings::AuditSettings;
