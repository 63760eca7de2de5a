#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::{Context, Result};
use birthdays_lib::config::AppConfig;
use birthdays_lib::migrate::{self, MIGRATIONS};
use clap::{Parser, Subcommand};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
    ConnectOptions, Row, SqlitePool,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(name = "migrate", about = "Birthdays migration helper")]
struct Cli {
    /// Optional explicit DB path
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List migrations and show applied/pending
    List,
    /// Show current migration status
    Status,
    /// Apply pending migrations
    Up {
        /// Print the plan without executing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Compare applied checksums against the embedded migrations
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    birthdays_lib::init_logging();

    let cli = Cli::parse();
    let db_path = AppConfig::resolve(cli.db)?.db_path;

    match cli.cmd {
        Cmd::List => list(&db_path).await,
        Cmd::Status => status(&db_path).await,
        Cmd::Up { dry_run } => up(&db_path, dry_run).await,
        Cmd::Verify => verify(&db_path).await,
    }
}

/// Read-only pool for inspecting an existing file; never creates one.
async fn open_existing(db: &Path) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::new()
        .filename(db)
        .create_if_missing(false)
        .journal_mode(SqliteJournalMode::Wal)
        .log_statements(log::LevelFilter::Off);
    SqlitePool::connect_with(opts)
        .await
        .with_context(|| format!("open {}", db.display()))
}

/// Applied versions with their stored checksums; empty when nothing was ever applied.
async fn applied_map(db: &Path) -> Result<HashMap<String, String>> {
    if !db.exists() {
        return Ok(HashMap::new());
    }
    let pool = open_existing(db).await?;
    let exists: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations'",
    )
    .fetch_optional(&pool)
    .await?;
    if exists.is_none() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query("SELECT version, checksum FROM schema_migrations")
        .fetch_all(&pool)
        .await?;
    pool.close().await;
    Ok(rows
        .into_iter()
        .filter_map(|r| {
            let version = r.try_get::<String, _>("version").ok()?;
            let checksum = r.try_get::<String, _>("checksum").ok()?;
            Some((version, checksum))
        })
        .collect())
}

async fn list(db: &Path) -> Result<()> {
    let applied = applied_map(db).await?;
    println!("DB: {}", db.display());
    for (file, _) in MIGRATIONS {
        let state = if applied.contains_key(*file) {
            "applied"
        } else {
            "pending"
        };
        println!("{:<40}  {}", file.trim_end_matches(".sql"), state);
    }
    Ok(())
}

async fn status(db: &Path) -> Result<()> {
    let applied = applied_map(db).await?;
    let applied_count = MIGRATIONS
        .iter()
        .filter(|(file, _)| applied.contains_key(*file))
        .count();
    let head = MIGRATIONS
        .iter()
        .rev()
        .find(|(file, _)| applied.contains_key(*file))
        .map(|(file, _)| file.trim_end_matches(".sql"))
        .unwrap_or("<none>");
    println!("DB: {}", db.display());
    println!("Applied: {}/{}", applied_count, MIGRATIONS.len());
    println!("Head: {}", head);
    Ok(())
}

async fn up(db: &Path, dry: bool) -> Result<()> {
    let applied = applied_map(db).await?;
    let plan: Vec<&str> = MIGRATIONS
        .iter()
        .map(|(file, _)| *file)
        .filter(|file| !applied.contains_key(*file))
        .collect();

    if plan.is_empty() {
        println!("Nothing to apply.");
        return Ok(());
    }
    println!("Plan (up):");
    for file in &plan {
        println!("  {}", file);
    }
    if dry {
        return Ok(());
    }

    let pool = birthdays_lib::db::open_sqlite_pool(db).await?;
    migrate::apply_migrations(&pool).await?;
    pool.close().await;
    println!("Applied {} migration(s).", plan.len());
    Ok(())
}

async fn verify(db: &Path) -> Result<()> {
    let applied = applied_map(db).await?;
    let mut problems = 0;
    for (version, stored) in &applied {
        match MIGRATIONS.iter().find(|(file, _)| *file == version.as_str()) {
            None => {
                println!("unknown   {}", version);
                problems += 1;
            }
            Some((_, sql)) if &migrate::checksum(sql) != stored => {
                println!("modified  {}", version);
                problems += 1;
            }
            Some(_) => println!("ok        {}", version),
        }
    }
    if problems > 0 {
        anyhow::bail!("{} migration(s) do not match this build", problems);
    }
    Ok(())
}
