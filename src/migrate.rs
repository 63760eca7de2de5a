use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use sqlx::{Executor, Row, SqlitePool};
use std::collections::HashMap;

use crate::time::now_ms;
use crate::AppError;
use tracing::{error, info};

fn preview(sql: &str) -> String {
    let one_line = sql.replace(['\n', '\t'], " ");
    let trimmed = one_line.trim();
    if trimmed.chars().count() > 160 {
        let cut: String = trimmed.chars().take(160).collect();
        format!("{cut}…")
    } else {
        trimmed.to_string()
    }
}

pub static MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_initial.sql",
        include_str!("../migrations/0001_initial.sql"),
    ),
    (
        "0002_profile_fields.sql",
        include_str!("../migrations/0002_profile_fields.sql"),
    ),
    (
        "0003_notification_offsets.sql",
        include_str!("../migrations/0003_notification_offsets.sql"),
    ),
    (
        "0004_backfill_notification_time.sql",
        include_str!("../migrations/0004_backfill_notification_time.sql"),
    ),
    (
        "0005_app_settings.sql",
        include_str!("../migrations/0005_app_settings.sql"),
    ),
    (
        "0006_scheduled_alarms.sql",
        include_str!("../migrations/0006_scheduled_alarms.sql"),
    ),
];

static ADD_COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^ALTER\s+TABLE\s+(\w+)\s+ADD\s+COLUMN\s+(\w+)").expect("static regex")
});

/// Migration body without blank lines or `--` comments; this is what gets checksummed.
fn clean_sql(raw_sql: &str) -> String {
    raw_sql
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            !(t.is_empty() || t.starts_with("--"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn checksum(raw_sql: &str) -> String {
    format!("{:x}", Sha256::digest(clean_sql(raw_sql).as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: &'static str,
    pub applied_at: Option<i64>,
}

async fn ensure_ledger(pool: &SqlitePool) -> anyhow::Result<()> {
    pool.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
           version   TEXT PRIMARY KEY,\
           applied_at INTEGER NOT NULL,\
           checksum TEXT NOT NULL\
         )",
    )
    .await?;
    Ok(())
}

async fn applied_versions(pool: &SqlitePool) -> anyhow::Result<HashMap<String, (String, i64)>> {
    let rows = sqlx::query("SELECT version, checksum, applied_at FROM schema_migrations")
        .fetch_all(pool)
        .await?;
    let mut applied = HashMap::new();
    for r in rows {
        let version: String = r.try_get("version")?;
        let checksum: String = r.try_get("checksum")?;
        let applied_at: i64 = r.try_get("applied_at")?;
        applied.insert(version, (checksum, applied_at));
    }
    Ok(applied)
}

/// Every known migration with the time it was applied, if it was.
pub async fn status(pool: &SqlitePool) -> anyhow::Result<Vec<MigrationStatus>> {
    ensure_ledger(pool).await?;
    let applied = applied_versions(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .map(|(version, _)| MigrationStatus {
            version,
            applied_at: applied.get(*version).map(|(_, at)| *at),
        })
        .collect())
}

/// Apply pending migrations in order. A database that records a migration this
/// build does not know, or whose applied migration was edited, is refused rather
/// than rebuilt.
pub async fn apply_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    ensure_ledger(pool).await?;
    let applied = applied_versions(pool).await?;

    if let Some(unknown) = applied
        .keys()
        .find(|v| !MIGRATIONS.iter().any(|(known, _)| known == v))
    {
        error!(target: "birthdays", event = "migration_unknown_version", version = %unknown);
        return Err(AppError::new(
            "MIGRATE/UNKNOWN_VERSION",
            "Database was written by a newer version of the app",
        )
        .with_context("version", unknown.clone())
        .into());
    }

    for (filename, raw_sql) in MIGRATIONS {
        let cleaned = clean_sql(raw_sql);
        let checksum = checksum(raw_sql);

        if let Some((stored, _)) = applied.get(*filename) {
            if stored != &checksum {
                return Err(AppError::new(
                    "MIGRATE/CHECKSUM_MISMATCH",
                    "A migration was edited after it was applied",
                )
                .with_context("version", filename.to_string())
                .into());
            }
            info!(target: "birthdays", event = "migration_skip_file", file = %filename);
            continue;
        }

        let mut tx = pool.begin().await?;
        for stmt in cleaned.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            let upper = s.to_ascii_uppercase();
            if upper == "BEGIN" || upper == "COMMIT" {
                continue;
            }
            if let Some(caps) = ADD_COLUMN_RE.captures(s) {
                let table = &caps[1];
                let col = &caps[2];
                let exists: Option<i64> = sqlx::query_scalar(&format!(
                    "SELECT 1 FROM pragma_table_info('{}') WHERE name='{}'",
                    table, col
                ))
                .fetch_optional(&mut *tx)
                .await?;
                if exists.is_some() {
                    info!(target: "birthdays", event = "migration_stmt_skip", file = %filename, sql = %preview(s));
                    continue;
                }
            }
            info!(target: "birthdays", event = "migration_stmt", file = %filename, sql = %preview(s));
            if let Err(e) = sqlx::query(s).execute(&mut *tx).await {
                error!(target: "birthdays", event = "migration_stmt_error", file = %filename, sql = %preview(s), error = %e);
                return Err(e.into());
            }
        }

        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at, checksum) VALUES (?, ?, ?)",
        )
        .bind(*filename)
        .bind(now_ms())
        .bind(&checksum)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(target: "birthdays", event = "migration_file_applied", file = %filename);
    }

    Ok(())
}
