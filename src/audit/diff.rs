//! Diff engine
//!
//! Diffs are built from an entity's dirty map, filtered by the resolved field
//! policy, and hold values in canonical stored form so that undo can decode
//! them again.

use crate::error::{AuditError, AuditResult};
use crate::host::{Entity, EntityType};
use crate::models::{render_raw, stored_eq, Rendered};

use super::record::{Change, Diff};

/// Whether a field may appear in a diff
///
/// Unknown fields and fields that are audit-excluded, never persisted, never
/// saved or read-only are not auditable.
pub fn is_auditable(kind: &EntityType, field: &str) -> bool {
    kind.policy(field).map_or(false, |p| p.auditable)
}

/// `(prior, current)` for every dirty auditable field
pub fn compute_diff(entity: &Entity) -> Diff {
    let kind = entity.kind();
    let persistence = entity.persistence();
    let mut diff = Diff::new();

    for (field, prior) in entity.dirty() {
        if !is_auditable(kind, field) {
            continue;
        }
        let Some(def) = kind.schema().get_field(field) else {
            continue;
        };

        let current = entity.fields().get(field).cloned().unwrap_or_default();
        diff.insert(
            field.clone(),
            Change {
                old: persistence.typecast_save(def, prior),
                new: persistence.typecast_save(def, &current),
            },
        );
    }

    diff
}

/// `(current, null)` for every auditable field, as recorded before a delete
pub fn snapshot_for_delete(entity: &Entity) -> Diff {
    auditable_values(entity)
        .map(|(field, stored)| (field, Change::new(stored, serde_json::Value::Null)))
        .collect()
}

/// `(null, current)` for every auditable field, as recorded after a create
pub fn snapshot_for_create(entity: &Entity) -> Diff {
    auditable_values(entity)
        .map(|(field, stored)| (field, Change::new(serde_json::Value::Null, stored)))
        .collect()
}

fn auditable_values(entity: &Entity) -> impl Iterator<Item = (String, serde_json::Value)> + '_ {
    let kind = entity.kind();
    let persistence = entity.persistence();

    kind.schema()
        .fields
        .iter()
        .filter(move |def| is_auditable(kind, &def.name))
        .map(move |def| {
            let value = entity.fields().get(&def.name).cloned().unwrap_or_default();
            (def.name.clone(), persistence.typecast_save(def, &value))
        })
}

/// Drop reactive entries whose new value is exactly what was requested
///
/// Entries for fields the request did not set (or set to null) are kept.
pub fn purge_requested(reactive: Diff, request: &Diff) -> Diff {
    reactive
        .into_iter()
        .filter(|(field, change)| match request.get(field) {
            Some(requested) if !requested.new.is_null() => !stored_eq(&requested.new, &change.new),
            _ => true,
        })
        .collect()
}

/// Render a stored value for a field of `kind`
pub fn render_value(kind: &EntityType, field: &str, stored: &serde_json::Value) -> Rendered {
    match kind.schema().get_field(field) {
        Some(def) => def.field_type.render(stored),
        None => render_raw(stored),
    }
}

/// `field=value, field=value`, or `no changes` for an empty diff
///
/// The new side of every change must render as text; otherwise the whole
/// rendering fails with a serialization error naming the field.
pub fn render_diff(diff: &Diff, kind: &EntityType) -> AuditResult<String> {
    if diff.is_empty() {
        return Ok("no changes".to_string());
    }

    let mut parts = Vec::with_capacity(diff.len());
    for (field, change) in diff {
        match render_value(kind, field, &change.new) {
            Rendered::Text(text) => parts.push(format!("{}={}", field, text)),
            Rendered::Unrenderable => {
                return Err(AuditError::Serialization {
                    field: field.clone(),
                    from: change.old.to_string(),
                    to: change.new.to_string(),
                })
            }
        }
    }

    Ok(parts.join(", "))
}
