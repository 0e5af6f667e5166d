use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use audit_trail::cli::{
    handle_comment_command, handle_create_command, handle_delete_command,
    handle_export_command, handle_history_command, handle_set_command, handle_show_command,
    handle_undo_command, ExportFormat, Workspace,
};
use audit_trail::config::{AuditPaths, AuditSettings};

#[derive(Parser)]
#[command(
    name = "audit-trail",
    version,
    about = "Field-level change tracking and undo for record stores",
    long_about = "audit-trail records every change made to your entities as an audit \
                  record with field-level diffs, shows their history, and undoes any \
                  change together with everything it caused."
)]
struct Cli {
    /// Entity schema file (JSON or YAML); defaults to the one in the data directory
    #[arg(long, global = true, env = "AUDIT_TRAIL_SCHEMA")]
    schema: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the audit history feed
    #[command(alias = "log")]
    History {
        /// Entity type
        #[arg(short = 't', long = "type")]
        entity_type: Option<String>,
        /// Entity id (requires --type)
        #[arg(short, long)]
        id: Option<u64>,
        /// Number of records to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one audit record in full
    Show {
        /// Record id (7, #7 or log-7)
        record: String,
    },

    /// Create an entity
    Create {
        /// Entity type
        entity_type: String,
        /// Field assignments (field=value)
        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Change fields of an entity
    Set {
        /// Entity type
        entity_type: String,
        /// Entity id
        id: u64,
        /// Field assignments (field=value)
        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Delete an entity
    Delete {
        /// Entity type
        entity_type: String,
        /// Entity id
        id: u64,
    },

    /// Attach a comment to an entity's history
    Comment {
        /// Entity type
        entity_type: String,
        /// Entity id
        id: u64,
        /// Comment text
        text: String,
    },

    /// Undo a record and everything it caused
    Undo {
        /// Record id (7, #7 or log-7)
        record: String,
    },

    /// Export audit history to a file
    Export {
        /// Output file path
        output: PathBuf,
        /// Export format
        #[arg(short, long, value_enum, default_value = "json")]
        format: ExportFormat,
        /// Entity type
        #[arg(short = 't', long = "type")]
        entity_type: Option<String>,
        /// Entity id (requires --type)
        #[arg(short, long)]
        id: Option<u64>,
    },

    /// Show current configuration and paths
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("AUDIT_TRAIL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let paths = AuditPaths::new()?;

    let command = match cli.command {
        Some(Commands::Config) => {
            let settings = AuditSettings::load_or_create(&paths)?;
            println!("audit-trail Configuration");
            println!("=========================");
            println!("Base directory:  {}", paths.base_dir().display());
            println!("Settings file:   {}", paths.settings_file().display());
            println!("Schema file:     {}", paths.schema_file().display());
            println!("Store file:      {}", paths.store_file().display());
            println!();
            println!("Settings:");
            println!("  Audit table:       {}", settings.audit_table);
            println!("  Record time taken: {}", settings.record_time_taken);
            println!("  History limit:     {}", settings.history_limit);
            println!("  Date format:       {}", settings.date_format);
            return Ok(());
        }
        Some(command) => command,
        None => {
            println!("audit-trail - change tracking and undo");
            println!();
            println!("Run 'audit-trail --help' for usage information.");
            return Ok(());
        }
    };

    let workspace = Workspace::open(paths, cli.schema.as_deref())?;

    match command {
        Commands::History {
            entity_type,
            id,
            limit,
        } => handle_history_command(&workspace, entity_type.as_deref(), id, limit)?,
        Commands::Show { record } => handle_show_command(&workspace, &record)?,
        Commands::Create {
            entity_type,
            assignments,
        } => handle_create_command(&workspace, &entity_type, &assignments)?,
        Commands::Set {
            entity_type,
            id,
            assignments,
        } => handle_set_command(&workspace, &entity_type, id, &assignments)?,
        Commands::Delete { entity_type, id } => {
            handle_delete_command(&workspace, &entity_type, id)?
        }
        Commands::Comment {
            entity_type,
            id,
            text,
        } => handle_comment_command(&workspace, &entity_type, id, &text)?,
        Commands::Undo { record } => handle_undo_command(&workspace, &record)?,
        Commands::Export {
            output,
            format,
            entity_type,
            id,
        } => handle_export_command(&workspace, &output, format, entity_type.as_deref(), id)?,
        Commands::Config => {}
    }

    Ok(())
}
