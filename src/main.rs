// 🧪 log-quality - validate log files against a schema, quarantine bad rows
// Report JSON goes to stdout (or --output), diagnostics to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use log_quality::{pipeline, BatchResult, CleanRowsMode, Schema, DEFAULT_PATTERN};

#[derive(Parser)]
#[command(name = "log-quality")]
#[command(about = "Schema-driven validation and quarantine for authentication logs", long_about = None)]
#[command(version)]
struct Cli {
    /// Schema JSON file (default: built-in auth_log schema)
    #[arg(long, global = true, env = "LOG_QUALITY_SCHEMA")]
    schema: Option<PathBuf>,

    /// Emit the clean records themselves instead of a count
    #[arg(long, global = true, default_value = "false")]
    materialize: bool,

    /// Write the report here instead of stdout
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// ✅ Validates one or more log files (.csv, .json, .jsonl)
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// 📂 Validates every matching file in a directory
    Scan {
        dir: PathBuf,

        /// Glob pattern relative to the directory
        #[arg(long, default_value = DEFAULT_PATTERN)]
        pattern: String,
    },

    /// 📋 Prints the active schema as JSON
    Schema,
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    // A bad schema aborts before any log file is read
    let schema = load_schema(cli.schema.as_deref())?;

    let mode = if cli.materialize {
        CleanRowsMode::Materialized
    } else {
        CleanRowsMode::Count
    };

    match cli.command {
        Commands::Check { files } => {
            let result = pipeline::run_files(&schema, &files);
            emit_report(&result, mode, cli.output.as_deref())?;
        }
        Commands::Scan { dir, pattern } => {
            let result = pipeline::run_directory(&schema, &dir, &pattern);
            emit_report(&result, mode, cli.output.as_deref())?;
        }
        Commands::Schema => {
            let json = serde_json::to_string_pretty(&schema.to_config())
                .context("Failed to serialize schema")?;
            emit(&json, cli.output.as_deref())?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_schema(path: Option<&Path>) -> Result<Schema> {
    match path {
        Some(path) => Schema::from_file(path),
        None => Schema::auth_log().context("Built-in auth_log schema is invalid"),
    }
}

fn emit_report(result: &BatchResult, mode: CleanRowsMode, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(&result.to_document(mode))
        .context("Failed to serialize report")?;
    emit(&json, output)
}

fn emit(json: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, format!("{}\n", json))
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            tracing::info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
