//! CLI command for trail export

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use clap::ValueEnum;

use crate::error::{AuditError, AuditResult};
use crate::export::{export_trail_csv, export_trail_json, export_trail_yaml, TrailExport};

use super::history::jail_for;
use super::workspace::Workspace;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// One row per record
    Csv,
    /// Versioned JSON document
    Json,
    /// Versioned YAML document
    Yaml,
}

/// Export the trail selected by `--type` / `--id` to a file
pub fn handle_export_command(
    workspace: &Workspace,
    output: &Path,
    format: ExportFormat,
    entity_type: Option<&str>,
    id: Option<u64>,
) -> AuditResult<()> {
    let jail = jail_for(entity_type, id)?;
    let mut records = workspace.log().query(jail.as_ref(), None)?;
    records.reverse();

    let scope = match &jail {
        Some(jail) => match jail.entity_id {
            Some(id) => format!("{} #{}", jail.entity_type, id),
            None => jail.entity_type.clone(),
        },
        None => "all".to_string(),
    };

    let file = File::create(output).map_err(|e| {
        AuditError::Export(format!("Failed to create file {}: {}", output.display(), e))
    })?;
    let mut writer = BufWriter::new(file);

    let count = records.len();
    match format {
        ExportFormat::Csv => export_trail_csv(&records, &mut writer)?,
        ExportFormat::Json => {
            export_trail_json(&TrailExport::new(scope, records), &mut writer, true)?
        }
        ExportFormat::Yaml => export_trail_yaml(&TrailExport::new(scope, records), &mut writer)?,
    }
    writer
        .flush()
        .map_err(|e| AuditError::Export(e.to_string()))?;

    println!("Exported {} records to: {}", count, output.display());
    Ok(())
}
