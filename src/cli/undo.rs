//! Undo CLI command

use crate::display::format_record_line;
use crate::error::AuditResult;

use super::history::parse_record_id;
use super::workspace::Workspace;

/// Undo a record and everything it initiated
pub fn handle_undo_command(workspace: &Workspace, record: &str) -> AuditResult<()> {
    let id = parse_record_id(record)?;
    let log = workspace.log();
    let before = log.read_all()?.last().and_then(|r| r.id);

    let mut ctx = workspace.context();
    let reverted = workspace
        .engine()
        .undo(&workspace.persistence, &mut ctx, id)?;

    let date_format = &workspace.settings.date_format;
    println!("Reverted {}", format_record_line(&reverted, date_format));

    for record in log.read_all()? {
        if record.id > before {
            println!("  {}", format_record_line(&record, date_format));
        }
    }
    Ok(())
}
