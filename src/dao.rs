//! Typed queries over the `birthdays` table. Every function takes any SQLite
//! executor, so the same query runs against the pool or inside a transaction.

use chrono::NaiveDate;
use sqlx::{FromRow, SqliteExecutor};
use unicode_normalization::UnicodeNormalization;

use crate::model::{time_of_day, Birthday};
use crate::time::to_date;

const SELECT_COLUMNS: &str = "SELECT id, name, birth_date, notes, notifications_enabled, \
     advance_notification_days, notification_hour, notification_minute, image_uri, \
     relationship, is_pinned, notification_offsets, notification_time, created_at \
     FROM birthdays";

/// Predicate for list queries and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BirthdayQuery {
    All,
    Pinned,
    /// Birth month, 1 to 12.
    Month(u32),
    /// Case- and accent-insensitive match on name, notes and relationship.
    Search(String),
}

#[derive(Debug, FromRow)]
struct BirthdayRow {
    id: i64,
    name: String,
    birth_date: String,
    notes: Option<String>,
    notifications_enabled: bool,
    advance_notification_days: i64,
    notification_hour: Option<i64>,
    notification_minute: Option<i64>,
    image_uri: Option<String>,
    relationship: Option<String>,
    is_pinned: bool,
    notification_offsets: String,
    notification_time: Option<String>,
    created_at: i64,
}

fn decode_error(column: &str, detail: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("{detail}").into(),
    }
}

fn to_u32(column: &str, value: i64) -> Result<u32, sqlx::Error> {
    u32::try_from(value).map_err(|_| decode_error(column, format!("{value} out of range")))
}

impl TryFrom<BirthdayRow> for Birthday {
    type Error = sqlx::Error;

    fn try_from(row: BirthdayRow) -> Result<Self, Self::Error> {
        let birth_date = NaiveDate::parse_from_str(&row.birth_date, "%Y-%m-%d")
            .map_err(|e| decode_error("birth_date", e))?;
        let notification_offsets: Vec<u32> = serde_json::from_str(&row.notification_offsets)
            .map_err(|e| decode_error("notification_offsets", e))?;
        let notification_time = match row.notification_time.as_deref() {
            Some(raw) => Some(
                time_of_day::parse(raw)
                    .ok_or_else(|| decode_error("notification_time", raw))?,
            ),
            None => None,
        };
        Ok(Birthday {
            id: row.id,
            name: row.name,
            birth_date,
            notes: row.notes,
            notifications_enabled: row.notifications_enabled,
            advance_notification_days: to_u32(
                "advance_notification_days",
                row.advance_notification_days,
            )?,
            notification_hour: row
                .notification_hour
                .map(|h| to_u32("notification_hour", h))
                .transpose()?,
            notification_minute: row
                .notification_minute
                .map(|m| to_u32("notification_minute", m))
                .transpose()?,
            image_uri: row.image_uri,
            relationship: row.relationship,
            is_pinned: row.is_pinned,
            notification_offsets,
            notification_time,
            created_at: to_date(row.created_at),
        })
    }
}

fn offsets_json(record: &Birthday) -> String {
    serde_json::to_string(&record.notification_offsets).unwrap_or_else(|_| "[]".to_string())
}

fn time_text(record: &Birthday) -> Option<String> {
    record.notification_time.as_ref().map(time_of_day::format)
}

/// Insert with a store-assigned identifier; `record.id` is ignored.
pub async fn insert<'e, E: SqliteExecutor<'e>>(
    exec: E,
    record: &Birthday,
) -> Result<i64, sqlx::Error> {
    let res = sqlx::query(
        "INSERT INTO birthdays (name, birth_date, notes, notifications_enabled, \
         advance_notification_days, notification_hour, notification_minute, image_uri, \
         relationship, is_pinned, notification_offsets, notification_time, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.name)
    .bind(record.birth_date.format("%Y-%m-%d").to_string())
    .bind(&record.notes)
    .bind(record.notifications_enabled)
    .bind(i64::from(record.advance_notification_days))
    .bind(record.notification_hour.map(i64::from))
    .bind(record.notification_minute.map(i64::from))
    .bind(&record.image_uri)
    .bind(&record.relationship)
    .bind(record.is_pinned)
    .bind(offsets_json(record))
    .bind(time_text(record))
    .bind(record.created_at.timestamp_millis())
    .execute(exec)
    .await?;
    Ok(res.last_insert_rowid())
}

/// Insert keeping `record.id`. Fails on an identifier collision.
pub async fn insert_with_id<'e, E: SqliteExecutor<'e>>(
    exec: E,
    record: &Birthday,
) -> Result<i64, sqlx::Error> {
    sqlx::query(
        "INSERT INTO birthdays (id, name, birth_date, notes, notifications_enabled, \
         advance_notification_days, notification_hour, notification_minute, image_uri, \
         relationship, is_pinned, notification_offsets, notification_time, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.id)
    .bind(&record.name)
    .bind(record.birth_date.format("%Y-%m-%d").to_string())
    .bind(&record.notes)
    .bind(record.notifications_enabled)
    .bind(i64::from(record.advance_notification_days))
    .bind(record.notification_hour.map(i64::from))
    .bind(record.notification_minute.map(i64::from))
    .bind(&record.image_uri)
    .bind(&record.relationship)
    .bind(record.is_pinned)
    .bind(offsets_json(record))
    .bind(time_text(record))
    .bind(record.created_at.timestamp_millis())
    .execute(exec)
    .await?;
    Ok(record.id)
}

/// Overwrite every mutable column; returns the number of rows touched.
pub async fn update<'e, E: SqliteExecutor<'e>>(
    exec: E,
    record: &Birthday,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE birthdays SET name = ?, birth_date = ?, notes = ?, notifications_enabled = ?, \
         advance_notification_days = ?, notification_hour = ?, notification_minute = ?, \
         image_uri = ?, relationship = ?, is_pinned = ?, notification_offsets = ?, \
         notification_time = ? WHERE id = ?",
    )
    .bind(&record.name)
    .bind(record.birth_date.format("%Y-%m-%d").to_string())
    .bind(&record.notes)
    .bind(record.notifications_enabled)
    .bind(i64::from(record.advance_notification_days))
    .bind(record.notification_hour.map(i64::from))
    .bind(record.notification_minute.map(i64::from))
    .bind(&record.image_uri)
    .bind(&record.relationship)
    .bind(record.is_pinned)
    .bind(offsets_json(record))
    .bind(time_text(record))
    .bind(record.id)
    .execute(exec)
    .await?;
    Ok(res.rows_affected())
}

pub async fn set_pinned<'e, E: SqliteExecutor<'e>>(
    exec: E,
    id: i64,
    pinned: bool,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("UPDATE birthdays SET is_pinned = ? WHERE id = ?")
        .bind(pinned)
        .bind(id)
        .execute(exec)
        .await?;
    Ok(res.rows_affected())
}

pub async fn delete<'e, E: SqliteExecutor<'e>>(exec: E, id: i64) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("DELETE FROM birthdays WHERE id = ?")
        .bind(id)
        .execute(exec)
        .await?;
    Ok(res.rows_affected())
}

pub async fn get<'e, E: SqliteExecutor<'e>>(
    exec: E,
    id: i64,
) -> Result<Option<Birthday>, sqlx::Error> {
    let sql = format!("{SELECT_COLUMNS} WHERE id = ?");
    let row: Option<BirthdayRow> = sqlx::query_as(&sql).bind(id).fetch_optional(exec).await?;
    row.map(Birthday::try_from).transpose()
}

pub async fn count<'e, E: SqliteExecutor<'e>>(exec: E) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM birthdays")
        .fetch_one(exec)
        .await
}

/// Records matching `query`, ordered by name.
pub async fn list<'e, E: SqliteExecutor<'e>>(
    exec: E,
    query: &BirthdayQuery,
) -> Result<Vec<Birthday>, sqlx::Error> {
    let order = "ORDER BY name COLLATE NOCASE, id";
    let rows: Vec<BirthdayRow> = match query {
        BirthdayQuery::All | BirthdayQuery::Search(_) => {
            sqlx::query_as(&format!("{SELECT_COLUMNS} {order}"))
                .fetch_all(exec)
                .await?
        }
        BirthdayQuery::Pinned => {
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE is_pinned = 1 {order}"))
                .fetch_all(exec)
                .await?
        }
        BirthdayQuery::Month(month) => {
            sqlx::query_as(&format!(
                "{SELECT_COLUMNS} WHERE substr(birth_date, 6, 2) = ? {order}"
            ))
            .bind(format!("{month:02}"))
            .fetch_all(exec)
            .await?
        }
    };
    let records = rows
        .into_iter()
        .map(Birthday::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match query {
        BirthdayQuery::Search(term) => {
            let needle = fold(term);
            records
                .into_iter()
                .filter(|b| matches_search(b, &needle))
                .collect()
        }
        _ => records,
    })
}

/// Lowercase and strip combining marks so "José" matches "jose".
pub fn fold(text: &str) -> String {
    text.nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .trim()
        .to_string()
}

fn matches_search(record: &Birthday, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    [
        Some(record.name.as_str()),
        record.notes.as_deref(),
        record.relationship.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| fold(field).contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_strips_accents_and_case() {
        assert_eq!(fold("  JOSÉ Ñúñez "), "jose nunez");
    }
}
