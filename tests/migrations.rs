#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use anyhow::Result;
use birthdays_lib::migrate::{self, MIGRATIONS};
use birthdays_lib::AppError;
use sqlx::SqlitePool;
use util::{migrated_pool, temp_pool};

async fn assert_table_exists(pool: &SqlitePool, name: &str) -> Result<()> {
    let exists: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type='table' AND name=?;")
            .bind(name)
            .fetch_optional(pool)
            .await?;
    assert!(exists.is_some(), "expected table `{name}`");
    Ok(())
}

async fn columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    Ok(sqlx::query_scalar(&format!("SELECT name FROM pragma_table_info('{table}')"))
        .fetch_all(pool)
        .await?)
}

fn code_of(err: &anyhow::Error) -> Option<&str> {
    err.downcast_ref::<AppError>().map(AppError::code)
}

#[tokio::test]
async fn migrates_from_zero_and_is_idempotent() -> Result<()> {
    let pool = temp_pool().await;
    migrate::apply_migrations(&pool).await?;
    migrate::apply_migrations(&pool).await?;

    for table in ["birthdays", "app_settings", "scheduled_alarms", "schema_migrations"] {
        assert_table_exists(&pool, table).await?;
    }
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count as usize, MIGRATIONS.len());

    let cols = columns(&pool, "birthdays").await?;
    for col in [
        "notification_hour",
        "notification_minute",
        "image_uri",
        "relationship",
        "is_pinned",
        "notification_offsets",
        "notification_time",
    ] {
        assert!(cols.iter().any(|c| c == col), "missing column {col}");
    }

    let status = migrate::status(&pool).await?;
    assert!(status.iter().all(|s| s.applied_at.is_some()));
    Ok(())
}

#[tokio::test]
async fn legacy_reminder_time_is_backfilled() -> Result<()> {
    let pool = migrated_pool().await;
    sqlx::query(
        "INSERT INTO birthdays (name, birth_date, notification_hour, notification_minute, created_at) \
         VALUES ('Legacy', '1970-05-06', 7, NULL, 0), ('Modern', '1980-01-02', 6, 15, 0)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("UPDATE birthdays SET notification_time = '20:00' WHERE name = 'Modern'")
        .execute(&pool)
        .await?;

    // Re-run the backfill body as an upgrade from a pre-0004 database would.
    let (_, backfill) = MIGRATIONS
        .iter()
        .find(|(file, _)| file.starts_with("0004"))
        .unwrap();
    sqlx::query(backfill).execute(&pool).await?;

    let rows: Vec<(String, Option<String>, Option<i64>)> = sqlx::query_as(
        "SELECT name, notification_time, notification_hour FROM birthdays ORDER BY name",
    )
    .fetch_all(&pool)
    .await?;
    assert_eq!(
        rows,
        vec![
            ("Legacy".to_string(), Some("07:00".to_string()), Some(7)),
            ("Modern".to_string(), Some("20:00".to_string()), Some(6)),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn refuses_database_from_a_newer_build() -> Result<()> {
    let pool = migrated_pool().await;
    sqlx::query(
        "INSERT INTO schema_migrations (version, applied_at, checksum) \
         VALUES ('9999_from_the_future.sql', 0, 'x')",
    )
    .execute(&pool)
    .await?;

    let err = migrate::apply_migrations(&pool).await.unwrap_err();
    assert_eq!(code_of(&err), Some("MIGRATE/UNKNOWN_VERSION"));

    // Nothing was dropped.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count as usize, MIGRATIONS.len() + 1);
    Ok(())
}

#[tokio::test]
async fn detects_edited_migration() -> Result<()> {
    let pool = migrated_pool().await;
    sqlx::query("UPDATE schema_migrations SET checksum = 'edited' WHERE version = ?")
        .bind(MIGRATIONS[0].0)
        .execute(&pool)
        .await?;

    let err = migrate::apply_migrations(&pool).await.unwrap_err();
    assert_eq!(code_of(&err), Some("MIGRATE/CHECKSUM_MISMATCH"));
    Ok(())
}

#[tokio::test]
async fn rows_survive_later_migrations() -> Result<()> {
    let pool = temp_pool().await;
    // Only the first migration, as an early install would have.
    let (first, sql) = MIGRATIONS[0];
    sqlx::raw_sql(sql).execute(&pool).await?;
    sqlx::query(
        "INSERT INTO birthdays (name, birth_date, notification_hour, created_at) \
         VALUES ('Early', '1960-09-10', 8, 0)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE TABLE schema_migrations (version TEXT PRIMARY KEY, applied_at INTEGER NOT NULL, checksum TEXT NOT NULL)")
        .execute(&pool)
        .await?;
    sqlx::query("INSERT INTO schema_migrations VALUES (?, 0, ?)")
        .bind(first)
        .bind(migrate::checksum(sql))
        .execute(&pool)
        .await?;

    migrate::apply_migrations(&pool).await?;

    let (time, offsets, pinned): (Option<String>, String, i64) = sqlx::query_as(
        "SELECT notification_time, notification_offsets, is_pinned FROM birthdays WHERE name = 'Early'",
    )
    .fetch_one(&pool)
    .await?;
    assert_eq!(time.as_deref(), Some("08:00"));
    assert_eq!(offsets, "[]");
    assert_eq!(pinned, 0);
    Ok(())
}
