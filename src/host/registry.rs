//! Entity type registry
//!
//! Maps stable type ids to entity types so that an audit record's
//! `entity_type` can be turned back into something that loads and saves.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use super::entity::EntityType;
use crate::error::{AuditError, AuditResult};
use crate::models::EntitySchema;

#[derive(Debug, Default)]
pub struct EntityRegistry {
    types: RwLock<BTreeMap<String, Arc<EntityType>>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of schemas
    pub fn from_schemas(schemas: Vec<EntitySchema>) -> AuditResult<Self> {
        let registry = Self::new();
        for schema in schemas {
            registry.register(schema)?;
        }
        Ok(registry)
    }

    /// Validate and register a schema
    pub fn register(&self, schema: EntitySchema) -> AuditResult<Arc<EntityType>> {
        let kind = EntityType::new(schema)?;
        self.register_type(Arc::clone(&kind))?;
        Ok(kind)
    }

    /// Register an already built type; type ids must be unique
    pub fn register_type(&self, kind: Arc<EntityType>) -> AuditResult<()> {
        let mut types = self
            .types
            .write()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        if types.contains_key(kind.type_id()) {
            return Err(AuditError::Configuration(format!(
                "Entity type '{}' is already registered",
                kind.type_id()
            )));
        }

        tracing::debug!(type_id = kind.type_id(), "registered entity type");
        types.insert(kind.type_id().to_string(), kind);
        Ok(())
    }

    pub fn find(&self, type_id: &str) -> Option<Arc<EntityType>> {
        self.types.read().ok()?.get(type_id).cloned()
    }

    /// Resolve a type id, failing for unknown types
    pub fn get(&self, type_id: &str) -> AuditResult<Arc<EntityType>> {
        self.find(type_id).ok_or_else(|| {
            AuditError::Configuration(format!("Unknown entity type '{}'", type_id))
        })
    }

    pub fn type_ids(&self) -> Vec<String> {
        self.types
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn types(&self) -> Vec<Arc<EntityType>> {
        self.types
            .read()
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.types.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read entity schemas from a JSON or YAML file holding a list of schemas
pub fn load_schemas(path: &Path) -> AuditResult<Vec<EntitySchema>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AuditError::Configuration(format!("Failed to read schema file {}: {}", path.display(), e))
    })?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );

    if is_yaml {
        serde_yaml::from_str(&contents).map_err(|e| {
            AuditError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })
    } else {
        serde_json::from_str(&contents).map_err(|e| {
            AuditError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldDef, FieldType};
    use tempfile::TempDir;

    fn country() -> EntitySchema {
        EntitySchema::new("country").with_field(FieldDef::new("name", FieldType::String))
    }

    #[test]
    fn test_register_and_get() {
        let registry = EntityRegistry::new();
        registry.register(country()).unwrap();

        assert_eq!(registry.get("country").unwrap().type_id(), "country");
        assert_eq!(registry.type_ids(), vec!["country".to_string()]);
        assert!(registry.get("planet").unwrap_err().is_configuration());
    }

    #[test]
    fn test_duplicate_type_is_rejected() {
        let registry = EntityRegistry::new();
        registry.register(country()).unwrap();
        assert!(registry.register(country()).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_schema_is_rejected() {
        let registry = EntityRegistry::new();
        assert!(registry.register(EntitySchema::new(" ")).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_schemas_yaml_and_json() {
        let temp_dir = TempDir::new().unwrap();

        let yaml = temp_dir.path().join("schema.yaml");
        std::fs::write(
            &yaml,
            "- type_id: country\n  title_field: name\n  fields:\n    - name: name\n    - name: population\n      type: integer\n",
        )
        .unwrap();
        let schemas = load_schemas(&yaml).unwrap();
        assert_eq!(schemas[0].get_field("population").unwrap().field_type, FieldType::Integer);

        let json = temp_dir.path().join("schema.json");
        std::fs::write(&json, r#"[{"type_id": "user", "fields": [{"name": "name"}]}]"#).unwrap();
        let registry = EntityRegistry::from_schemas(load_schemas(&json).unwrap()).unwrap();
        assert!(registry.find("user").is_some());
    }

    #[test]
    fn test_missing_schema_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = load_schemas(&temp_dir.path().join("none.json")).unwrap_err();
        assert!(err.is_configuration());
    }
}
