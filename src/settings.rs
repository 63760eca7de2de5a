//! User-adjustable runtime settings kept in the `app_settings` table.

use chrono::NaiveTime;
use serde::Serialize;
use sqlx::SqliteExecutor;

use crate::model::{time_of_day, DEFAULT_REMINDER_TIME};
use crate::time::now_ms;
use crate::{AppError, AppResult};

const KEY_NOTIFICATIONS_ENABLED: &str = "notifications_enabled";
const KEY_DEFAULT_TIME: &str = "default_reminder_time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSettings {
    /// Master switch; when off no alarms are armed for any record.
    pub notifications_enabled: bool,
    /// Reminder time for records without a time of their own.
    #[serde(with = "plain_time")]
    pub default_time: NaiveTime,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        let (hour, minute) = DEFAULT_REMINDER_TIME;
        Self {
            notifications_enabled: true,
            default_time: NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

mod plain_time {
    use chrono::NaiveTime;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::time_of_day::format(value))
    }
}

async fn get_value<'e, E: SqliteExecutor<'e>>(
    exec: E,
    key: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT value FROM app_settings WHERE key = ?")
        .bind(key)
        .fetch_optional(exec)
        .await
}

async fn set_value<'e, E: SqliteExecutor<'e>>(
    exec: E,
    key: &str,
    value: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO app_settings (key, value, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(now_ms())
    .execute(exec)
    .await?;
    Ok(())
}

/// Stored settings, with defaults for anything never written. Unreadable values
/// fall back to the default and are logged.
pub async fn load(pool: &sqlx::SqlitePool) -> AppResult<ReminderSettings> {
    let mut settings = ReminderSettings::default();

    if let Some(raw) = get_value(pool, KEY_NOTIFICATIONS_ENABLED).await? {
        match raw.as_str() {
            "1" | "true" => settings.notifications_enabled = true,
            "0" | "false" => settings.notifications_enabled = false,
            other => tracing::warn!(
                target: "birthdays",
                event = "setting_unreadable",
                key = KEY_NOTIFICATIONS_ENABLED,
                value = %other
            ),
        }
    }

    if let Some(raw) = get_value(pool, KEY_DEFAULT_TIME).await? {
        match time_of_day::parse(&raw) {
            Some(time) => settings.default_time = time,
            None => tracing::warn!(
                target: "birthdays",
                event = "setting_unreadable",
                key = KEY_DEFAULT_TIME,
                value = %raw
            ),
        }
    }

    Ok(settings)
}

pub async fn set_notifications_enabled(pool: &sqlx::SqlitePool, enabled: bool) -> AppResult<()> {
    set_value(
        pool,
        KEY_NOTIFICATIONS_ENABLED,
        if enabled { "1" } else { "0" },
    )
    .await?;
    tracing::info!(target: "birthdays", event = "setting_changed", key = KEY_NOTIFICATIONS_ENABLED, value = enabled);
    Ok(())
}

pub async fn set_default_time(pool: &sqlx::SqlitePool, time: NaiveTime) -> AppResult<()> {
    let text = time_of_day::format(&time);
    set_value(pool, KEY_DEFAULT_TIME, &text).await?;
    tracing::info!(target: "birthdays", event = "setting_changed", key = KEY_DEFAULT_TIME, value = %text);
    Ok(())
}

/// Parse a user-entered `HH:MM` for the default reminder time.
pub fn parse_time(raw: &str) -> AppResult<NaiveTime> {
    time_of_day::parse(raw).ok_or_else(|| {
        AppError::validation(vec![crate::error::FieldError::new(
            "notificationTime",
            format!("'{raw}' is not a time of day (HH:MM)"),
        )])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_enabled_at_nine() {
        let s = ReminderSettings::default();
        assert!(s.notifications_enabled);
        assert_eq!(s.default_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    }

    #[test]
    fn parse_time_rejects_garbage() {
        assert!(parse_time("25:00").is_err());
        assert_eq!(parse_time("07:05").unwrap(), NaiveTime::from_hms_opt(7, 5, 0).unwrap());
    }
}
