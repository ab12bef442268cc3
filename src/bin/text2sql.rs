//! text2sql — ask the employee database from the terminal
//!
//! # Usage
//!
//! ```bash
//! # Translate, check and execute
//! text2sql "Сотрудники IT отдела"
//!
//! # Dry run (show SQL only)
//! text2sql "Зарплата больше 150000" --dry-run
//!
//! # Why did it produce that SQL?
//! text2sql explain "Сколько сотрудников в ИТ"
//! ```

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use text2sql::format::display_value;
use text2sql::prelude::*;
use text2sql::rules::rule_names;
use text2sql::schema::TABLE_NAME;
use text2sql::safety;
use text2sql::service::SAMPLE_QUERIES;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "text2sql")]
#[command(version)]
#[command(about = "Natural-language questions to safe, read-only SQL", long_about = None)]
#[command(after_help = "EXAMPLES:
    text2sql 'Показать всех сотрудников'
    text2sql 'Зарплата от 100000 до 200000' --format json
    text2sql 'Найти менеджеров' --dry-run --no-model")]
struct Cli {
    /// The question to answer
    query: Option<String>,

    /// Don't execute, just show the generated SQL
    #[arg(short, long)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database connection URL
    #[arg(long, env = "TEXT2SQL_DATABASE_URL")]
    database_url: Option<String>,

    /// Use the rule translator only
    #[arg(long)]
    no_model: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a question is translated
    Explain {
        /// The question to explain
        query: String,
    },
    /// Show or clear the question history
    History {
        #[arg(long)]
        clear: bool,
    },
    /// Print example questions
    Samples,
    /// Summary statistics of the employee table
    Info,
    /// Database and model status
    Health,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn default_filter(verbose: bool) -> &'static str {
    if verbose { "text2sql=debug" } else { "text2sql=warn" }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    if cli.no_model {
        config.model.enabled = false;
    }

    let translator = make_translator(&config);

    match &cli.command {
        Some(Commands::Explain { query }) => explain(&translator, query).await,
        Some(Commands::History { clear }) => show_history(&config, *clear),
        Some(Commands::Samples) => {
            for sample in SAMPLE_QUERIES {
                println!("  • {}", sample.cyan());
            }
            Ok(())
        }
        Some(Commands::Info) => {
            let db = connect(&config).await?;
            let structure = db.table_structure(TABLE_NAME).await?;
            let service = build_service(&config, translator, db);
            let info = service.db_info().await?;
            let report = serde_json::json!({
                "table": TABLE_NAME,
                "columns": &structure,
                "stats": &info,
            });
            print_json_or(&cli.format, &report, || {
                println!("{} {}", "Table:".dimmed(), TABLE_NAME.cyan());
                for column in &structure {
                    println!("  {}", column.to_string().white());
                }
                println!("{} {}", "Employees:".dimmed(), info.total_employees.to_string().cyan());
                println!("{} {}", "Departments:".dimmed(), info.departments.join(", "));
                println!(
                    "{} {} .. {} (avg {}, total {})",
                    "Salary:".dimmed(),
                    text2sql::format::format_money(info.min_salary),
                    text2sql::format::format_money(info.max_salary),
                    text2sql::format::format_money(info.avg_salary),
                    text2sql::format::format_money(info.total_salary),
                );
                for stat in &info.department_stats {
                    println!(
                        "  {:14} {:>4}  {}",
                        stat.department.white(),
                        stat.count,
                        text2sql::format::format_money(stat.avg_salary).yellow()
                    );
                }
            })
        }
        Some(Commands::Health) => {
            let service = match connect(&config).await {
                Ok(db) => build_service(&config, translator, db),
                Err(_) => offline_service(&config, translator),
            };
            let health = service.health().await;
            print_json_or(&cli.format, &health, || {
                println!("{} {}", "Database:".dimmed(), health.database);
                println!("{} {}", "Model:".dimmed(), health.model);
                println!("{} {}", "History:".dimmed(), health.history_count);
                println!("{} {}", "Time:".dimmed(), health.timestamp);
            })
        }
        None => match &cli.query {
            Some(query) => answer(query, &cli, &config, translator).await,
            None => {
                println!("{}", "text2sql — natural-language questions to SQL".cyan().bold());
                println!();
                println!("Usage: text2sql <QUESTION> [OPTIONS]");
                println!();
                println!("Try: text2sql --help");
                Ok(())
            }
        },
    }
}

async fn answer(
    query: &str,
    cli: &Cli,
    config: &Config,
    translator: Translator,
) -> anyhow::Result<()> {
    if cli.verbose {
        println!("{} {}", "Input:".dimmed(), query.yellow());
    }

    if cli.dry_run {
        let result = translator.convert(query).await;
        match &result {
            TranslationResult::Success { sql_text, .. } => {
                println!("{}", "Generated SQL:".green().bold());
                println!("{}", sql_text.white());
                if let SafetyVerdict::Rejected { offending_operation } = safety::check(sql_text) {
                    println!("{} {}", "⚠ Would be refused:".yellow(), offending_operation);
                }
            }
            TranslationResult::Failure { reason } => {
                anyhow::bail!("translation failed: {}", reason)
            }
        }
        return Ok(());
    }

    let db = connect(config).await?;
    let mut service = build_service(config, translator, db);
    let outcome = service.process(query).await;

    if let OutputFormat::Json = cli.format {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        QueryOutcome::Empty => println!("{}", "(empty question)".dimmed()),
        QueryOutcome::Rows {
            sql,
            columns,
            results,
            ..
        } => {
            println!("{} {}", "SQL:".dimmed(), sql.white());
            println!();
            print_table(&columns, &results);
        }
        QueryOutcome::Rejected {
            sql,
            offending_operation,
            ..
        } => {
            println!("{}", "Query contains potentially unsafe operations".red().bold());
            println!("  {} {}", "SQL:".dimmed(), sql);
            println!("  {} {}", "Operation:".dimmed(), offending_operation.yellow());
        }
        QueryOutcome::DatabaseError { sql, message, .. } => {
            println!("{} {}", "Database error:".red().bold(), message);
            println!("  {} {}", "SQL:".dimmed(), sql);
        }
    }
    Ok(())
}

async fn explain(translator: &Translator, query: &str) -> anyhow::Result<()> {
    println!("{}", "Query Explanation".cyan().bold());
    println!();
    println!("{} {}", "Question:".dimmed(), query.yellow());
    println!();

    let found = RuleTranslator::new(translator.schema()).translate(query);
    println!("{}", "Rule Translator:".green().bold());
    println!("  {} {}", "Rule:".dimmed(), found.rule.cyan());
    println!("  {} {}", "Order:".dimmed(), rule_names().join(" → ").dimmed());
    if !found.matched_terms.is_empty() {
        println!("  {} {}", "Terms:".dimmed(), found.matched_terms.join(", ").white());
    }
    for (name, value) in &found.entities {
        println!("    {} = {}", name.white(), value.to_string().yellow());
    }
    println!("  {} {}", "SQL:".dimmed(), found.sql.white());

    println!();
    let result = translator.convert(query).await;
    match &result {
        TranslationResult::Success { sql_text, source, .. } => {
            println!("{} {:?}", "Chosen Translator:".green().bold(), source);
            println!("  {} {}", "SQL:".dimmed(), sql_text.white());
            println!("  {} {}", "Gate:".dimmed(), safety::check(sql_text).to_string().cyan());
        }
        TranslationResult::Failure { reason } => {
            println!("{} {}", "Translation failed:".red().bold(), reason);
        }
    }
    Ok(())
}

fn show_history(config: &Config, clear: bool) -> anyhow::Result<()> {
    let mut history = HistoryStore::open(&config.history.path, config.history.capacity);
    if clear {
        history.clear()?;
        println!("{} History cleared", "✓".green());
        return Ok(());
    }
    if history.is_empty() {
        println!("{}", "(no history)".dimmed());
    }
    for entry in history.entries() {
        println!(
            "  {} {}",
            entry.submitted_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            entry.query.white()
        );
    }
    Ok(())
}

fn make_translator(config: &Config) -> Translator {
    Translator::from_config(&config.model)
        .with_schema(SchemaDescriptor::from_config(&config.schema))
}

async fn connect(config: &Config) -> anyhow::Result<EmployeeDb> {
    EmployeeDb::connect(&config.database)
        .await
        .context("set database.url or TEXT2SQL_DATABASE_URL")
}

fn build_service(config: &Config, translator: Translator, db: EmployeeDb) -> QueryService {
    let history = HistoryStore::open(&config.history.path, config.history.capacity);
    QueryService::new(translator, Box::new(db), history)
}

/// Executor used when the database could not be reached.
struct Offline(String);

#[async_trait]
impl QueryExecutor for Offline {
    async fn execute(&self, _sql: &str) -> Text2SqlResult<QueryRows> {
        Err(Text2SqlError::Connection(self.0.clone()))
    }
}

fn offline_service(config: &Config, translator: Translator) -> QueryService {
    let history = HistoryStore::open(&config.history.path, config.history.capacity);
    QueryService::new(translator, Box::new(Offline(config.database.url.clone())), history)
}

fn print_json_or<T: serde::Serialize>(
    format: &OutputFormat,
    value: &T,
    table: impl FnOnce(),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Table => table(),
    }
    Ok(())
}

fn print_table(columns: &[String], results: &[Map<String, Value>]) {
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    // Calculate column widths
    let mut widths: HashMap<&String, usize> =
        columns.iter().map(|c| (c, c.chars().count())).collect();
    for row in results {
        for col in columns {
            let len = row.get(col).map(display_value).unwrap_or_default().chars().count();
            if let Some(w) = widths.get_mut(col) {
                *w = (*w).max(len);
            }
        }
    }

    let header: Vec<String> = columns
        .iter()
        .map(|c| format!("{:width$}", c, width = widths[c]))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    let sep: Vec<String> = columns.iter().map(|c| "─".repeat(widths[c])).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for row in results {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| {
                let val = row.get(c).map(display_value).unwrap_or_default();
                format!("{:width$}", val, width = widths[c])
            })
            .collect();
        println!("{}", cells.join(" │ "));
    }

    println!();
    println!("{} row(s) returned", results.len().to_string().cyan());
}
