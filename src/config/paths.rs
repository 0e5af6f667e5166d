//! Path management for audit-trail
//!
//! ## Path Resolution Order
//!
//! 1. `AUDIT_TRAIL_DATA_DIR` environment variable (if set)
//! 2. Unix (Linux/macOS): `$XDG_CONFIG_HOME/audit-trail` or `~/.config/audit-trail`
//! 3. Windows: `%APPDATA%\audit-trail`

use std::path::PathBuf;

use crate::error::AuditError;

/// Environment variable overriding the base directory
pub const DATA_DIR_ENV: &str = "AUDIT_TRAIL_DATA_DIR";

/// Manages all paths used by audit-trail
#[derive(Debug, Clone)]
pub struct AuditPaths {
    /// Base directory for settings, schemas and data
    base_dir: PathBuf,
}

impl AuditPaths {
    /// Resolve the base directory from the environment
    ///
    /// # Errors
    ///
    /// Returns an error if neither the override nor a home directory is set.
    pub fn new() -> Result<Self, AuditError> {
        let base_dir = match std::env::var(DATA_DIR_ENV) {
            Ok(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => resolve_default_path()?,
        };

        Ok(Self { base_dir })
    }

    /// Create AuditPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Directory holding the backend store
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Path to the backend store
    pub fn store_file(&self) -> PathBuf {
        self.data_dir().join("store.json")
    }

    /// Entity schema file; `schema.json` wins over `schema.yaml` when both exist
    pub fn schema_file(&self) -> PathBuf {
        let json = self.base_dir.join("schema.json");
        if json.exists() {
            return json;
        }

        for name in ["schema.yaml", "schema.yml"] {
            let yaml = self.base_dir.join(name);
            if yaml.exists() {
                return yaml;
            }
        }

        json
    }

    /// Ensure the base and data directories exist
    pub fn ensure_directories(&self) -> Result<(), AuditError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| AuditError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.data_dir())
            .map_err(|e| AuditError::Io(format!("Failed to create data directory: {}", e)))?;

        Ok(())
    }

    /// Check if a settings file has been written
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

#[cfg(not(windows))]
fn resolve_default_path() -> Result<PathBuf, AuditError> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("audit-trail"));
    }

    let home = std::env::var("HOME").map_err(|_| {
        AuditError::Configuration("Could not determine home directory (HOME is not set)".into())
    })?;
    Ok(PathBuf::from(home).join(".config").join("audit-trail"))
}

#[cfg(windows)]
fn resolve_default_path() -> Result<PathBuf, AuditError> {
    let appdata = std::env::var("APPDATA").map_err(|_| {
        AuditError::Configuration("Could not determine APPDATA directory".into())
    })?;
    Ok(PathBuf::from(appdata).join("audit-trail"))
}
