use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sqlaudit_catalog::{LiveDatabase, SchemaSnapshot, SnapshotDatabase};
use sqlaudit_core::{AuditConfig, AuditReport, ResultRow};
use sqlaudit_engine::Session;

const DEFAULT_CONFIG: &str = "sqlaudit.toml";

/// sqlaudit - MySQL statement audit and rollback generation
#[derive(Parser)]
#[command(name = "sqlaudit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: sqlaudit.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a SQL file against a schema snapshot
    Check {
        /// SQL file holding the batch
        sql_file: PathBuf,

        /// JSON schema snapshot (empty schema if omitted)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Default database for unqualified table names
        #[arg(short, long)]
        database: Option<String>,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Also output markdown report
        #[arg(short, long)]
        markdown: Option<PathBuf>,
    },

    /// Write a config file with the default settings
    InitConfig {
        /// Destination (default: sqlaudit.toml)
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = if let Some(config_path) = &cli.config {
        AuditConfig::from_file(config_path)?
    } else if Path::new(DEFAULT_CONFIG).exists() {
        AuditConfig::from_file(Path::new(DEFAULT_CONFIG))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        AuditConfig::default()
    };

    match cli.command {
        Commands::Check {
            sql_file,
            schema,
            database,
            output,
            markdown,
        } => {
            check_command(
                config,
                &sql_file,
                schema.as_deref(),
                database,
                &output,
                markdown.as_deref(),
                cli.verbose,
            )
            .await
        }
        Commands::InitConfig { path } => init_config_command(&config, path, cli.verbose),
    }
}

/// Check command - run the Check stage over a batch file
async fn check_command(
    mut config: AuditConfig,
    sql_file: &Path,
    schema: Option<&Path>,
    database: Option<String>,
    output: &Path,
    markdown: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    if database.is_some() {
        config.options.database = database;
    }

    let batch = std::fs::read_to_string(sql_file)
        .with_context(|| format!("failed to read {}", sql_file.display()))?;
    debug!("Read {} byte(s) from {}", batch.len(), sql_file.display());

    let db = match schema {
        Some(path) => {
            if verbose {
                eprintln!("{} {}", "Loading schema snapshot from:".cyan(), path.display());
            }
            SnapshotDatabase::from_file(path)?
        }
        None => {
            if verbose {
                eprintln!("{}", "No schema snapshot given, every table starts unknown".yellow());
            }
            SnapshotDatabase::new(SchemaSnapshot::default())
        }
    };

    if verbose {
        eprintln!(
            "{} {} ({} table(s)), default database: {}",
            "Auditing against".cyan(),
            db.name(),
            db.table_count(),
            config.options.database.as_deref().unwrap_or("<none>")
        );
    }

    // A snapshot is read-only: only the Check stage makes sense here
    let mut session = Session::new(config, Arc::new(db));
    let outcome = session.audit(&batch).await.map(|_| ());
    if let Err(e) = &outcome {
        eprintln!("{} {}", "Audit stopped:".red().bold(), e);
    }

    let report = AuditReport::from_records(session.records());

    report.save_to_file(output)?;
    if verbose {
        eprintln!("{} {}", "Report written to:".green(), output.display());
    }

    if let Some(md_path) = markdown {
        std::fs::write(md_path, generate_markdown_report(&report))?;
        if verbose {
            eprintln!("{} {}", "Markdown report written to:".green(), md_path.display());
        }
    }

    print_report_summary(&report);

    if report.has_errors() || outcome.is_err() {
        std::process::exit(1);
    }

    Ok(())
}

/// Init-config command - write the effective configuration out
fn init_config_command(config: &AuditConfig, path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    config.save_to_file(&path)?;
    if verbose {
        eprintln!("{} {}", "Config written to:".green(), path.display());
    }
    println!("Created {}", path.display());
    Ok(())
}

fn print_report_summary(report: &AuditReport) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "SQL Audit Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Statements: {}", report.summary.total);

    if report.summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", report.summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", report.summary.errors).green());
    }

    if report.summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).green());
    }

    println!("  Clean:    {}", report.summary.clean);
    println!("  With rollback: {}", report.summary.with_rollback);
    println!();

    if report.rows.iter().all(|row| row.error_message.is_empty()) {
        println!("{}", "✓ No issues found!".green().bold());
        println!();
        return;
    }

    println!("{}", "Statements:".bold());
    for row in report.rows.iter().filter(|row| !row.error_message.is_empty()) {
        let level = match row.err_level {
            0 => "INFO".cyan(),
            1 => "WARN".yellow().bold(),
            _ => "ERROR".red().bold(),
        };

        println!("  [{}] #{} {}", level, row.id, first_line(&row.sql));
        for line in row.error_message.lines() {
            println!("    {}", line);
        }
    }
    println!();
}

fn generate_markdown_report(report: &AuditReport) -> String {
    let mut md = String::new();

    md.push_str("# SQL Audit Report\n\n");
    md.push_str(&format!("**Version:** {}\n\n", report.version));
    md.push_str(&format!("**Timestamp:** {}\n\n", report.timestamp));

    md.push_str("## Summary\n\n");
    md.push_str(&format!("- Statements: {}\n", report.summary.total));
    md.push_str(&format!("- Errors: {}\n", report.summary.errors));
    md.push_str(&format!("- Warnings: {}\n", report.summary.warnings));
    md.push_str(&format!("- Clean: {}\n", report.summary.clean));
    md.push_str(&format!("- With rollback: {}\n", report.summary.with_rollback));
    md.push('\n');

    if report.rows.is_empty() {
        md.push_str("✅ **No statements audited**\n");
        return md;
    }

    md.push_str("## Statements\n\n");
    md.push_str("| # | Stage | Level | Status | SQL | Message |\n");
    md.push_str("|---|---|---|---|---|---|\n");
    for row in &report.rows {
        md.push_str(&format!(
            "| {} | {} | {} | {} | `{}` | {} |\n",
            row.id,
            row.stage,
            row.err_level,
            table_cell(&row.stage_status),
            table_cell(&row.sql),
            table_cell(&row.error_message),
        ));
    }
    md.push('\n');

    let with_rollback: Vec<&ResultRow> =
        report.rows.iter().filter(|row| !row.rollback_sql.is_empty()).collect();
    if !with_rollback.is_empty() {
        md.push_str("## Rollback\n\n");
        for row in with_rollback {
            md.push_str(&format!("### Statement {}\n\n", row.id));
            md.push_str(&format!("```sql\n{}\n```\n\n", row.rollback_sql));
        }
    }

    md
}

fn first_line(sql: &str) -> &str {
    sql.lines().next().unwrap_or_default()
}

/// Markdown table cells cannot hold raw pipes or newlines
fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', "<br>")
}
