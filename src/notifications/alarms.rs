use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{Row, SqlitePool};

use super::{Alarm, AlarmKey, AlarmService};
use crate::time::now_ms;
use crate::{AppError, AppResult};

const TRIGGER_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// In-process alarm table.
#[derive(Debug)]
pub struct MemoryAlarmService {
    alarms: Mutex<BTreeMap<AlarmKey, Alarm>>,
    exact_permitted: AtomicBool,
}

impl Default for MemoryAlarmService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAlarmService {
    pub fn new() -> Self {
        Self {
            alarms: Mutex::new(BTreeMap::new()),
            exact_permitted: AtomicBool::new(true),
        }
    }

    pub fn set_exact_permitted(&self, permitted: bool) {
        self.exact_permitted.store(permitted, Ordering::SeqCst);
    }

    /// Every alarm currently set, ordered by key.
    pub fn snapshot(&self) -> Vec<Alarm> {
        self.alarms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AlarmService for MemoryAlarmService {
    async fn exact_alarms_permitted(&self) -> bool {
        self.exact_permitted.load(Ordering::SeqCst)
    }

    async fn schedule(&self, alarm: &Alarm) -> AppResult<()> {
        self.alarms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(alarm.key, alarm.clone());
        Ok(())
    }

    async fn cancel(&self, key: AlarmKey) -> AppResult<()> {
        self.alarms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
        Ok(())
    }

    async fn due(&self, now: NaiveDateTime) -> AppResult<Vec<Alarm>> {
        let mut due: Vec<Alarm> = self
            .alarms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|a| a.trigger_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|a| (a.trigger_at, a.key));
        Ok(due)
    }

    async fn scheduled_for(&self, record_id: i64) -> AppResult<Vec<Alarm>> {
        Ok(self
            .alarms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .range(AlarmKey::new(record_id, 0)..=AlarmKey::new(record_id, u32::MAX))
            .map(|(_, a)| a.clone())
            .collect())
    }
}

/// Alarm queue persisted in `scheduled_alarms`, drained by a periodic `notify` run.
#[derive(Debug, Clone)]
pub struct SqliteAlarmService {
    pool: SqlitePool,
}

impl SqliteAlarmService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn alarm_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<Alarm> {
    let record_id: i64 = row.try_get("record_id")?;
    let offset: i64 = row.try_get("offset_days")?;
    let trigger_raw: String = row.try_get("trigger_at")?;
    let occurrence_raw: String = row.try_get("occurrence")?;
    let bad_row = |what: &str, raw: &str| {
        AppError::new("STORAGE/ALARM_DECODE", format!("Unreadable alarm {what}"))
            .with_context("record_id", record_id.to_string())
            .with_context("value", raw.to_string())
    };
    Ok(Alarm {
        key: AlarmKey::new(
            record_id,
            u32::try_from(offset).map_err(|_| bad_row("offset", &offset.to_string()))?,
        ),
        trigger_at: NaiveDateTime::parse_from_str(&trigger_raw, TRIGGER_FORMAT)
            .map_err(|_| bad_row("trigger", &trigger_raw))?,
        occurrence: NaiveDate::parse_from_str(&occurrence_raw, "%Y-%m-%d")
            .map_err(|_| bad_row("occurrence", &occurrence_raw))?,
    })
}

#[async_trait]
impl AlarmService for SqliteAlarmService {
    async fn exact_alarms_permitted(&self) -> bool {
        true
    }

    async fn schedule(&self, alarm: &Alarm) -> AppResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO scheduled_alarms \
             (record_id, offset_days, trigger_at, occurrence, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(alarm.key.record_id)
        .bind(i64::from(alarm.key.offset_days))
        .bind(alarm.trigger_at.format(TRIGGER_FORMAT).to_string())
        .bind(alarm.occurrence.format("%Y-%m-%d").to_string())
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel(&self, key: AlarmKey) -> AppResult<()> {
        sqlx::query("DELETE FROM scheduled_alarms WHERE record_id = ? AND offset_days = ?")
            .bind(key.record_id)
            .bind(i64::from(key.offset_days))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cancel_many(&self, keys: &[AlarmKey]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM scheduled_alarms WHERE record_id = ? AND offset_days = ?")
                .bind(key.record_id)
                .bind(i64::from(key.offset_days))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn due(&self, now: NaiveDateTime) -> AppResult<Vec<Alarm>> {
        let rows = sqlx::query(
            "SELECT record_id, offset_days, trigger_at, occurrence FROM scheduled_alarms \
             WHERE trigger_at <= ? ORDER BY trigger_at, record_id, offset_days",
        )
        .bind(now.format(TRIGGER_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(alarm_from_row).collect()
    }

    async fn scheduled_for(&self, record_id: i64) -> AppResult<Vec<Alarm>> {
        let rows = sqlx::query(
            "SELECT record_id, offset_days, trigger_at, occurrence FROM scheduled_alarms \
             WHERE record_id = ? ORDER BY offset_days",
        )
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(alarm_from_row).collect()
    }
}
