//! filedb CLI - query a directory-of-JSON database

use clap::{Parser, Subcommand};
use filedb::{Config, FileDb, Params, QueryResult};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "filedb")]
#[command(about = "A directory-of-JSON record store with an SQL-subset query interface", long_about = None)]
struct Cli {
    /// Data directory (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and default tables
    Init,

    /// Execute one statement
    Query {
        /// The SQL statement to execute
        sql: String,

        /// Params as JSON: an array for `?`, an object for `:name`
        #[arg(short, long)]
        params: Option<String>,
    },

    /// Start interactive REPL mode
    Repl,

    /// List tables
    Tables,

    /// Delete empty record files and report corrupt ones
    Cleanup,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.data_dir)?;

    match cli.command {
        Commands::Init => init_database(config, cli.config.as_deref()).await,
        Commands::Query { sql, params } => execute_query(config, &sql, params.as_deref()).await,
        Commands::Repl => run_repl(config).await,
        Commands::Tables => list_tables(config).await,
        Commands::Cleanup => cleanup(config).await,
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_or_default(path)?,
        None => Config::default(),
    };
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    Ok(config)
}

fn parse_params(params: Option<&str>) -> anyhow::Result<Params> {
    match params {
        Some(text) => {
            let value: serde_json::Value = serde_json::from_str(text)?;
            Ok(Params::from(value))
        }
        None => Ok(Params::none()),
    }
}

async fn init_database(config: Config, config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("Initializing filedb at {:?}...", config.data_dir);

    if let Some(path) = config_path {
        if !path.exists() {
            config.save(path)?;
            println!("Wrote default config to {:?}", path);
        }
    }

    let db = FileDb::open(config).await?;
    let tables = db.store().tables().await?;

    println!("Database initialized with {} tables.", tables.len());
    println!();
    println!("Get started:");
    println!("  filedb query \"INSERT INTO roles_1 SET ?\" --params '[{{\"user_id\": 42, \"role_id\": 3}}]'");
    println!("  filedb query \"SELECT * FROM roles_1 WHERE user_id = ?\" --params '[42]'");

    Ok(())
}

async fn execute_query(config: Config, sql: &str, params: Option<&str>) -> anyhow::Result<()> {
    let db = FileDb::open(config).await?;
    let params = parse_params(params)?;

    let result = db.execute(sql, params).await?;
    print_result(&result)?;
    Ok(())
}

fn print_result(result: &QueryResult) -> anyhow::Result<()> {
    match result {
        QueryResult::Rows(rows) if rows.is_empty() => println!("(0 rows)"),
        QueryResult::Rows(rows) => {
            println!("{}", serde_json::to_string_pretty(&result.to_json())?);
            println!("({} row(s))", rows.len());
        }
        QueryResult::Affected(summary) => match &summary.insert_id {
            Some(id) => println!("({} row(s) affected, insert id {})", summary.affected_rows, id),
            None => println!("({} row(s) affected)", summary.affected_rows),
        },
        QueryResult::Tables { names, .. } => {
            for name in names {
                println!("  {}", name);
            }
            println!("({} table(s))", names.len());
        }
    }
    Ok(())
}

async fn run_repl(config: Config) -> anyhow::Result<()> {
    use std::io::{self, BufRead, Write};

    println!("filedb Interactive Shell");
    println!("Type 'help' for commands, 'exit' to quit.");
    println!();

    let mut db = FileDb::open(config).await?;
    db.init();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("filedb> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.to_lowercase().as_str() {
            "exit" | "quit" | "\\q" => break,
            "help" | "\\h" => {
                println!("Commands:");
                println!("  SELECT * FROM <table> [WHERE ...] [ORDER BY ...] [LIMIT n]");
                println!("  INSERT INTO <table> (a, b) VALUES (1, 'x')");
                println!("  UPDATE <table> SET a = 1 WHERE ...");
                println!("  DELETE FROM <table> WHERE ...");
                println!("  CREATE TABLE [IF NOT EXISTS] <name>");
                println!("  SHOW TABLES");
                println!();
                println!("Special:");
                println!("  stats, \\s - Show cache statistics");
                println!("  help, \\h  - Show this help");
                println!("  exit, \\q  - Exit the shell");
                continue;
            }
            "stats" | "\\s" => {
                println!("{}", db.cache().stats());
                continue;
            }
            _ => {}
        }

        match db.execute(line, ()).await {
            Ok(result) => print_result(&result)?,
            Err(e) => {
                println!("Error: {}", e);
                if let Some(hint) = e.suggestion() {
                    println!("Hint: {}", hint);
                }
            }
        }
        println!();
    }

    db.shutdown().await;
    println!("Goodbye!");
    Ok(())
}

async fn list_tables(config: Config) -> anyhow::Result<()> {
    let db = FileDb::open(config).await?;
    let store = db.store();

    println!("Tables:");
    for table in store.tables().await? {
        let records = store.list(&table).await?.len();
        println!("  {} ({} records)", table, records);
    }

    Ok(())
}

async fn cleanup(config: Config) -> anyhow::Result<()> {
    let db = FileDb::open(config).await?;
    let report = db.store().cleanup().await?;

    println!("Scanned {} record files.", report.scanned);
    for path in &report.removed {
        println!("  removed empty {:?}", path);
    }
    for path in &report.invalid {
        println!("  invalid JSON {:?}", path);
    }
    println!("Removed {}, invalid {}.", report.removed.len(), report.invalid.len());

    Ok(())
}
