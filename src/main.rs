//! CLI entry point for `sqlwarden`.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use sqlwarden::analyzer::statement::StatementKind;
use sqlwarden::config::Config;
use sqlwarden::error::AuthzError;
use sqlwarden::executor::engine::{ExecutionEngine, SqlValue};
use sqlwarden::executor::sqlite::SqliteEngine;
use sqlwarden::pipeline::authorize::AuthorizationPipeline;
use sqlwarden::store::backend::AuthorizationStore;
use sqlwarden::store::memory::MemoryStore;

#[derive(Parser)]
#[command(
    name = "sqlwarden",
    about = "Check a SQL statement against a permission policy and print the authorized SQL"
)]
struct Cli {
    /// SQL statement to authorize
    sql: String,

    /// JSON policy file with users, roles and permissions
    #[arg(long)]
    policy: PathBuf,

    /// User the statement runs as
    #[arg(long)]
    user: String,

    /// Verify this token for the user before authorizing
    #[arg(long)]
    token: Option<String>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Execute the authorized statement against this SQLite database
    #[arg(long)]
    database: Option<PathBuf>,

    /// Positional parameter (repeatable): null, integer, real, true/false or text
    #[arg(long = "param")]
    params: Vec<String>,

    /// Print pipeline stages to stderr
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    match run(&cli) {
        Ok(output) => println!("{output}"),
        Err(e) if e.is_denial() || matches!(e, AuthzError::Authentication(_)) => {
            eprintln!("Denied: {e}");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    }
}

fn run(cli: &Cli) -> Result<String, AuthzError> {
    let config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    let store = Arc::new(MemoryStore::from_path(&cli.policy)?);

    if let Some(token) = &cli.token {
        if !store.authenticate(&cli.user, token)? {
            return Err(AuthzError::Authentication(format!(
                "invalid credentials for {}",
                cli.user
            )));
        }
    }

    let pipeline = AuthorizationPipeline::from_config(Arc::clone(&store), &config)?;
    let authorized = pipeline.authorize(&cli.user, &cli.sql)?;

    if cli.verbose {
        let stages: Vec<String> = authorized.stages.iter().map(ToString::to_string).collect();
        eprintln!("Stages: {}", stages.join(" -> "));
    }

    let Some(database) = &cli.database else {
        return Ok(authorized.sql);
    };

    let engine = SqliteEngine::open(database)?;
    let params: Vec<SqlValue> = cli.params.iter().map(|p| SqlValue::from_literal(p)).collect();
    let rendered = if authorized.analysis.kind == StatementKind::Select {
        serde_json::to_string_pretty(&engine.query(&authorized.sql, &params)?)
    } else {
        serde_json::to_string_pretty(&engine.execute(&authorized.sql, &params)?)
    };
    rendered.map_err(|e| AuthzError::Execution(format!("cannot encode result: {e}")))
}
