//! SIMS Validate CLI - Validate species inventory submissions
//!
//! # Main Commands
//!
//! ```bash
//! sims-validate serve                               # Start HTTP server (port 3000)
//! sims-validate validate moose.xlsx --schema s.json # Validate a file against a schema
//! sims-validate template list                       # Manage validation templates
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! sims-validate parse moose.xlsx          # Dump parsed worksheets as JSON
//! sims-validate check-schema s.json       # Check a schema against the meta-schema
//! ```

use clap::{Parser, Subcommand};
use serde_json::Value;
use sims_validate::{
    api::{start_server, AppState, LogBroadcaster},
    check_config,
    config::AppConfig,
    logging::{init_logging, LogConfig, LogFormat},
    parse_media, read_worksheets, validate_submission,
    store::{DirectoryObjectStore, MemoryStore, TemplateRegistry},
    SubmissionTracker, ValidationSchemaParser, WorksheetSet,
};
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sims-validate")]
#[command(about = "Validate species inventory submissions against template schemas", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log format: pretty or json (default: SIMS_LOG_FORMAT or pretty)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV, XLSX or ZIP file and output its worksheets as JSON
    Parse {
        /// Input file
        input: PathBuf,

        /// Declared mimetype (default: inferred from content and extension)
        #[arg(short, long)]
        mimetype: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a file against a validation schema
    Validate {
        /// Input file
        input: PathBuf,

        /// Validation schema JSON file
        #[arg(short, long)]
        schema: PathBuf,

        /// Declared mimetype (default: inferred from content and extension)
        #[arg(short, long)]
        mimetype: Option<String>,

        /// Output file for the report (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a validation schema JSON file against the meta-schema
    CheckSchema {
        /// Validation schema JSON file
        input: PathBuf,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: SIMS_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage validation templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List all stored templates
    List,

    /// Import a validation schema JSON file into a template
    Import {
        /// Validation schema JSON file
        file: PathBuf,
        /// Template version
        #[arg(long)]
        version: String,
        /// Template name (default: the schema's name, then the file name)
        #[arg(short, long)]
        name: Option<String>,
        /// Species (taxonomic unit id) the schema applies to; any if omitted
        #[arg(long)]
        species: Option<i64>,
    },

    /// Show details of a template
    Show {
        /// Template ID
        id: i64,
    },

    /// Delete a template
    Delete {
        /// Template ID
        id: i64,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(2);
        }
    };

    let log_config = LogConfig::from_verbosity(cli.verbose)
        .with_format(cli.log_format.unwrap_or(config.log_format))
        .with_ansi(std::io::stderr().is_terminal());
    if let Err(e) = init_logging(&log_config) {
        eprintln!("⚠️  Logging disabled: {}", e);
    }

    let result = match cli.command {
        Commands::Parse {
            input,
            mimetype,
            output,
        } => cmd_parse(&input, mimetype.as_deref(), output.as_deref()),

        Commands::Validate {
            input,
            schema,
            mimetype,
            output,
        } => cmd_validate(&input, &schema, mimetype.as_deref(), output.as_deref()),

        Commands::CheckSchema { input } => cmd_check_schema(&input),

        Commands::Serve { port } => cmd_serve(&config, port.unwrap_or(config.port)).await,

        Commands::Template { action } => cmd_template(&config, action),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn read_input(input: &Path, mimetype: Option<&str>) -> Result<WorksheetSet, Box<dyn std::error::Error>> {
    let bytes = fs::read(input)?;
    let file_name = input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("upload")
        .to_string();

    let media = parse_media(bytes, &file_name, mimetype)?
        .ok_or_else(|| format!("Unsupported file type: {}", input.display()))?;
    Ok(read_worksheets(&media)?)
}

fn cmd_parse(input: &Path, mimetype: Option<&str>, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing: {}", input.display());

    let set = read_input(input, mimetype)?;
    eprintln!("   Mimetype: {}", set.mimetype);
    for (key, value) in &set.custom_properties {
        eprintln!("   Property: {} = {}", key, value);
    }
    for sheet in &set.worksheets {
        eprintln!("   Sheet '{}': {} columns, {} rows", sheet.name, sheet.headers.len(), sheet.rows.len());
    }

    let json = serde_json::to_string_pretty(&set)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_validate(
    input: &Path,
    schema: &Path,
    mimetype: Option<&str>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let parser = ValidationSchemaParser::from_str(&fs::read_to_string(schema)?)?;
    let set = read_input(input, mimetype)?;
    let report = validate_submission(&set, &parser);

    let json = serde_json::to_string_pretty(&report)?;
    write_output(&json, output)?;

    if report.is_valid() {
        eprintln!("\n✅ Valid ({} warning(s))", report.issue_count());
        Ok(())
    } else {
        eprintln!("\n❌ Invalid: {} issue(s)", report.issue_count());
        std::process::exit(1);
    }
}

fn cmd_check_schema(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Checking schema: {}", input.display());

    let document: Value = serde_json::from_str(&fs::read_to_string(input)?)?;

    if let Err(errors) = check_config(&document) {
        for err in errors.iter().take(10) {
            eprintln!("   - {}", err);
        }
        return Err(format!("{} meta-schema violation(s)", errors.len()).into());
    }

    ValidationSchemaParser::from_value(document)?;
    eprintln!("✅ Schema is valid");
    Ok(())
}

async fn cmd_serve(config: &AppConfig, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let registry = TemplateRegistry::with_dir(&config.template_dir);
    tracing::info!(
        templates = registry.list().len(),
        template_dir = %config.template_dir.display(),
        storage_dir = %config.storage_dir.display(),
        "Loaded template registry"
    );

    let memory = Arc::new(MemoryStore::new());
    let logs = Arc::new(LogBroadcaster::new());
    let tracker = SubmissionTracker::new(
        Arc::new(DirectoryObjectStore::new(&config.storage_dir)),
        memory.clone(),
        memory.clone(),
        Arc::new(registry),
        logs.clone(),
    );

    let state = AppState {
        tracker: Arc::new(tracker),
        submissions: memory.clone(),
        surveys: memory,
        logs,
    };
    start_server(state, port).await
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

fn cmd_template(config: &AppConfig, action: TemplateAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = TemplateRegistry::with_dir(&config.template_dir);

    match action {
        TemplateAction::List => {
            let templates = registry.list();
            if templates.is_empty() {
                eprintln!("📋 No templates stored yet.");
                eprintln!("   Use 'sims-validate template import <file> --version <v>' to add one.");
                return Ok(());
            }

            eprintln!("📋 Stored templates ({}):\n", templates.len());
            for t in templates {
                println!("  📄 {} v{} ({})", t.name, t.version, t.id);
                let species: Vec<String> = t
                    .species
                    .iter()
                    .map(|s| match s.wldtaxonomic_units_id {
                        Some(id) => id.to_string(),
                        None => "any".to_string(),
                    })
                    .collect();
                println!("     Species: {}", species.join(", "));
                println!();
            }
        }

        TemplateAction::Import {
            file,
            version,
            name,
            species,
        } => {
            eprintln!("📥 Importing schema from: {}", file.display());
            let id = registry.import(&file, name.as_deref(), &version, species)?;
            eprintln!("✅ Template saved with ID: {}", id);
        }

        TemplateAction::Show { id } => match registry.get(id) {
            Some(t) => {
                println!("📄 Template: {} v{} ({})\n", t.name, t.version, t.id);
                println!("Created: {}", t.created_at);
                for s in &t.species {
                    let species = s
                        .wldtaxonomic_units_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "any".to_string());
                    println!("\nSchema {} (species: {}):", s.id, species);
                    println!("{}", serde_json::to_string_pretty(&s.validation)?);
                }
            }
            None => {
                return Err(format!("Template not found: {}", id).into());
            }
        },

        TemplateAction::Delete { id } => {
            registry.delete(id)?;
            eprintln!("🗑️  Template deleted: {}", id);
        }
    }

    Ok(())
}
