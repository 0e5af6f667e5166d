//! Entity CLI commands
//!
//! Audited mutations of host entities: create, set, delete and manual
//! comments. Each prints the audit record it produced.

use std::sync::Arc;

use crate::audit::{custom_log, AuditRecord, Jail};
use crate::display::format_record_line;
use crate::error::AuditResult;

use super::workspace::Workspace;

fn report(workspace: &Workspace, record: Option<AuditRecord>) {
    match record {
        Some(record) => println!(
            "{}",
            format_record_line(&record, &workspace.settings.date_format)
        ),
        None => println!("No changes recorded."),
    }
}

/// Create an entity from `field=value` assignments
pub fn handle_create_command(
    workspace: &Workspace,
    entity_type: &str,
    assignments: &[String],
) -> AuditResult<()> {
    let kind = workspace.registry.get(entity_type)?;
    let mut entity = kind.new_entity(Arc::clone(&workspace.persistence));
    workspace.assign(&mut entity, assignments)?;

    let mut ctx = workspace.context();
    entity.save(&mut ctx)?;

    println!("Created {} #{}", entity_type, entity.require_id()?);
    report(workspace, workspace.controller.load_last(&entity)?);
    Ok(())
}

/// Update fields of an existing entity
pub fn handle_set_command(
    workspace: &Workspace,
    entity_type: &str,
    id: u64,
    assignments: &[String],
) -> AuditResult<()> {
    let mut entity = workspace.load(entity_type, id)?;
    let last = workspace.controller.load_last(&entity)?.and_then(|r| r.id);

    workspace.assign(&mut entity, assignments)?;
    let mut ctx = workspace.context();
    entity.save(&mut ctx)?;

    let record = workspace
        .controller
        .load_last(&entity)?
        .filter(|r| r.id != last);
    report(workspace, record);
    Ok(())
}

pub fn handle_delete_command(workspace: &Workspace, entity_type: &str, id: u64) -> AuditResult<()> {
    let mut entity = workspace.load(entity_type, id)?;
    let mut ctx = workspace.context();
    entity.delete(&mut ctx)?;

    println!("Deleted {} #{}", entity_type, id);
    report(workspace, workspace.log().load_last(&Jail::entity(entity_type, id))?);
    Ok(())
}

/// Attach a manual comment record to an entity
pub fn handle_comment_command(
    workspace: &Workspace,
    entity_type: &str,
    id: u64,
    text: &str,
) -> AuditResult<()> {
    let entity = workspace.load(entity_type, id)?;
    let mut ctx = workspace.context();
    let record = custom_log(&entity, &mut ctx, "comment", Some(text), None)?;

    report(workspace, Some(record));
    Ok(())
}
