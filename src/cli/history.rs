//! History CLI commands
//!
//! Shows the audit trail of one entity, one entity type or the whole store.

use crate::audit::Jail;
use crate::display::{format_history, format_record_details};
use crate::error::{AuditError, AuditResult};
use crate::models::AuditRecordId;

use super::workspace::Workspace;

/// Build the query scope from `--type` / `--id`
pub fn jail_for(entity_type: Option<&str>, id: Option<u64>) -> AuditResult<Option<Jail>> {
    match (entity_type, id) {
        (Some(entity_type), Some(id)) => Ok(Some(Jail::entity(entity_type, id))),
        (Some(entity_type), None) => Ok(Some(Jail::entity_type(entity_type))),
        (None, Some(_)) => Err(AuditError::Validation("--id requires --type".into())),
        (None, None) => Ok(None),
    }
}

/// Print a history feed, oldest first
pub fn handle_history_command(
    workspace: &Workspace,
    entity_type: Option<&str>,
    id: Option<u64>,
    limit: Option<usize>,
) -> AuditResult<()> {
    let jail = jail_for(entity_type, id)?;
    if let Some(jail) = &jail {
        workspace.registry.get(&jail.entity_type)?;
    }

    let limit = limit.unwrap_or(workspace.settings.history_limit);
    let records = workspace.log().read_recent(jail.as_ref(), limit)?;

    print!("{}", format_history(&records, &workspace.settings.date_format));
    Ok(())
}

/// Print every detail of one record
pub fn handle_show_command(workspace: &Workspace, record: &str) -> AuditResult<()> {
    let id = parse_record_id(record)?;
    let record = workspace.log().load(id)?;

    print!(
        "{}",
        format_record_details(&record, &workspace.settings.date_format)
    );
    Ok(())
}

/// Accepts `7`, `#7` or `log-7`
pub fn parse_record_id(raw: &str) -> AuditResult<AuditRecordId> {
    raw.parse()
        .map_err(|_| AuditError::Validation(format!("Invalid audit record id: '{}'", raw)))
}
