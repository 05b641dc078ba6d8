//! sqlweave: compose and run declared SQL operations
//!
//! # Usage
//!
//! ```bash
//! # Show the SQL for a filtered, ordered page
//! sqlweave get genres --filter "NameLike(pattern='R%')" --order "ByName(direction=desc)" --take 10 --dry-run
//!
//! # Run it against a database
//! sqlweave --database chinook.db get genres --filter "IdAbove(id=5)"
//!
//! # Insert two rows in one statement
//! sqlweave insert genres --row "Name(value='Rock')" --row "Name(value='Jazz')"
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use sqlweave::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlweave")]
#[command(version)]
#[command(about = "Compose parameterized SQL from declared operations", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqlweave get genres --filter \"NameEquals(name='Rock')\" --dry-run
    sqlweave update genres --set \"Name(value='Metal')\" --filter \"IdAbove(id=20)\"
    sqlweave operations genres")]
struct Cli {
    /// Config file (default: $SQLWEAVE_CONFIG, then the user config dir, then ./sqlweave.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQL dialect, overriding the config (sqlite, sqlserver)
    #[arg(long, global = true)]
    dialect: Option<Dialect>,

    /// SQLite database file, overriding the config
    #[arg(long, env = "SQLWEAVE_DATABASE", global = true)]
    database: Option<PathBuf>,

    /// Don't execute, just show the generated SQL
    #[arg(short, long, global = true)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Select rows
    Get {
        table: String,
        /// Filter requests, e.g. "NameEquals(name='Rock')"
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Order requests, e.g. "ByName(direction=desc)"
        #[arg(long)]
        order: Vec<String>,
        /// Rows to skip
        #[arg(long, requires = "take")]
        skip: Option<i64>,
        /// Rows to return
        #[arg(long)]
        take: Option<i64>,
    },
    /// Delete rows
    Delete {
        table: String,
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// Update rows
    Update {
        table: String,
        /// Merge requests, e.g. "Name(value='Metal')"
        #[arg(long, required = true)]
        set: Vec<String>,
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// Insert rows
    Insert {
        table: String,
        /// One row of merge requests; repeat for more rows
        #[arg(long = "row", required = true)]
        rows: Vec<String>,
    },
    /// List a table's declared operations
    Operations { table: String },
}

impl Commands {
    fn table(&self) -> &str {
        match self {
            Commands::Get { table, .. }
            | Commands::Delete { table, .. }
            | Commands::Update { table, .. }
            | Commands::Insert { table, .. }
            | Commands::Operations { table } => table,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("sqlweave=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse every argument as a list of requests.
fn requests(args: &[String]) -> Result<Vec<QueryOperation>> {
    let mut all = Vec::new();
    for arg in args {
        all.extend(parse_requests(arg).with_context(|| format!("invalid request '{}'", arg))?);
    }
    Ok(all)
}

async fn run(cli: &Cli) -> Result<()> {
    let config =
        WeaveConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let dialect = cli.dialect.unwrap_or(config.dialect);
    let composer = Composer::new(dialect);

    let name = cli.command.table();
    let table_config = config.table(name)?;
    let table = table_config.build(name)?;

    if cli.verbose {
        println!(
            "{} {} ({} operations, {})",
            "Table:".dimmed(),
            name.cyan(),
            table.len(),
            dialect
        );
    }

    let database = cli
        .database
        .clone()
        .map(SqliteConfig::file)
        .or_else(|| config.database.clone());
    let mut ctx = QueryContext::new(SqliteConnection::new(database.clone().unwrap_or_default()));

    let (sql, reads) = match &cli.command {
        Commands::Operations { .. } => {
            show_operations(&table);
            return Ok(());
        }
        Commands::Get {
            filters,
            order,
            skip,
            take,
            ..
        } => {
            let base = table_config.statement(name, StatementKind::Get)?;
            let page = take.map(|take| Page {
                skip: skip.unwrap_or(0),
                take,
            });
            let sql = composer.get_query(
                &mut ctx,
                &table,
                &base,
                &requests(filters)?,
                &requests(order)?,
                page,
            )?;
            (sql, true)
        }
        Commands::Delete { filters, .. } => {
            let base = table_config.statement(name, StatementKind::Delete)?;
            (composer.delete_query(&mut ctx, &table, &base, &requests(filters)?)?, false)
        }
        Commands::Update { set, filters, .. } => {
            let base = table_config.statement(name, StatementKind::Update)?;
            let sql = composer.update_query(
                &mut ctx,
                &table,
                &base,
                &requests(set)?,
                &requests(filters)?,
            )?;
            (sql, false)
        }
        Commands::Insert { rows, .. } => {
            let base = table_config.statement(name, StatementKind::Insert)?;
            let rows = rows
                .iter()
                .map(|row| requests(std::slice::from_ref(row)))
                .collect::<Result<Vec<_>>>()?;
            (composer.insert_query(&mut ctx, &table, &base, &rows)?, false)
        }
    };

    // Dry run or no database - just show SQL
    if cli.dry_run || database.is_none() {
        show_statement(&sql, ctx.parameters());
        if database.is_none() && !cli.dry_run {
            println!();
            println!(
                "{}",
                "⚠ No database. Use --database, set SQLWEAVE_DATABASE or add [database] to the config"
                    .yellow()
            );
        }
        return Ok(());
    }

    if cli.verbose {
        show_statement(&sql, ctx.parameters());
        println!();
    }

    ctx.add_statement(sql)?;
    if reads {
        let result = ctx.execute_next_result_set().await?;
        format_output(&result, &cli.format)?;
    } else {
        let affected = ctx.execute_commands().await?;
        println!("{} {} rows affected", "✓".green(), affected);
    }

    Ok(())
}

fn show_statement(sql: &str, parameters: &ParameterSet) {
    println!("{}", "Generated SQL:".green().bold());
    println!("{}", sql.white());

    if !parameters.is_empty() {
        println!();
        println!("{}", "Bindings:".cyan());
        for p in parameters {
            println!(
                "  @{} = {} {}",
                p.name,
                p.value.to_string().yellow(),
                format!("({})", p.db_type).dimmed()
            );
        }
    }
}

fn show_operations(table: &OperationTable) {
    println!("{} {}", "Operations of".cyan().bold(), table.name().cyan().bold());
    println!();

    for op in table.iter() {
        let metadata = op.metadata();
        println!(
            "{:8} {} {}",
            op.kind().to_string().yellow(),
            op.name().white().bold(),
            metadata.template().source().dimmed()
        );
        if let Some(merge) = op.as_merge() {
            let required = if merge.is_required() { ", required" } else { "" };
            println!("         column {}{}", merge.referenced_column().cyan(), required);
        }
        for p in metadata.parameters() {
            let default = match p.default_value() {
                Some(value) => format!(" = {}", value),
                None if p.has_default() => " = NULL".to_string(),
                None => String::new(),
            };
            println!("         • {}: {}{}", p.name(), p.db_type(), default.dimmed());
        }
    }
}

fn format_output(result: &ResultSet, format: &OutputFormat) -> Result<()> {
    if result.is_empty() {
        println!("{}", "(no results)".dimmed());
        return Ok(());
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result.to_json())?);
        }
        OutputFormat::Table => {
            let rows: Vec<Vec<String>> = result
                .rows
                .iter()
                .map(|row| row.iter().map(cell).collect())
                .collect();

            // Calculate column widths
            let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
            for row in &rows {
                for (width, value) in widths.iter_mut().zip(row) {
                    *width = (*width).max(value.chars().count());
                }
            }

            let header: Vec<String> = result
                .columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:width$}", c, width = *w))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in &rows {
                let cells: Vec<String> = row
                    .iter()
                    .zip(&widths)
                    .map(|(v, w)| format!("{:width$}", v, width = *w))
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", result.len().to_string().cyan());
        }
    }
    Ok(())
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}
