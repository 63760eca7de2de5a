#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use birthdays_lib::notifications::{MemoryAlarmService, Notifier};
use birthdays_lib::time::FixedClock;
use birthdays_lib::{build_repository, db, migrate, AppResult, BirthdayRepository};
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqlitePool;

pub async fn temp_pool() -> SqlitePool {
    db::open_memory_pool().await.expect("connect sqlite::memory:")
}

pub async fn migrated_pool() -> SqlitePool {
    let pool = temp_pool().await;
    migrate::apply_migrations(&pool).await.expect("migrate");
    pool
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Collects posted notifications instead of showing them.
#[derive(Default)]
pub struct RecordingNotifier {
    pub posted: Mutex<Vec<(String, String)>>,
    pub denied: AtomicBool,
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.posted
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn permission_granted(&self) -> bool {
        !self.denied.load(Ordering::SeqCst)
    }

    async fn post(&self, title: &str, body: &str) -> AppResult<()> {
        self.posted
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub pool: SqlitePool,
    pub repo: BirthdayRepository,
    pub alarms: Arc<MemoryAlarmService>,
    pub notifier: Arc<RecordingNotifier>,
}

/// A migrated in-memory database with in-process alarms, frozen at `now`.
pub async fn harness(now: NaiveDateTime) -> Harness {
    let pool = migrated_pool().await;
    let alarms = Arc::new(MemoryAlarmService::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let repo = build_repository(
        pool.clone(),
        alarms.clone(),
        notifier.clone(),
        Arc::new(FixedClock(now)),
    );
    Harness {
        pool,
        repo,
        alarms,
        notifier,
    }
}
