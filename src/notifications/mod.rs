//! Reminder alarms: what to schedule for a record, and the platform seams it is
//! scheduled through.

use std::fmt;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::AppResult;

pub mod alarms;
pub mod content;
pub mod scheduler;

pub use alarms::{MemoryAlarmService, SqliteAlarmService};
pub use content::{reminder_content, ReminderContent};
pub use scheduler::{plan_alarms, NotificationScheduler, RescheduleSummary, ScheduleOutcome};

/// Identity of one reminder: a record and how many days ahead it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AlarmKey {
    pub record_id: i64,
    pub offset_days: u32,
}

impl AlarmKey {
    pub fn new(record_id: i64, offset_days: u32) -> Self {
        Self {
            record_id,
            offset_days,
        }
    }

    /// Integer form for platforms that key alarms by a single request code.
    /// Offsets stay below 1000, so distinct keys never share a code.
    pub fn request_code(&self) -> i64 {
        self.record_id * 1000 + i64::from(self.offset_days)
    }
}

impl fmt::Display for AlarmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.record_id, self.offset_days)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alarm {
    pub key: AlarmKey,
    /// Local wall-clock time the reminder fires.
    pub trigger_at: NaiveDateTime,
    /// The birthday this reminder leads up to.
    pub occurrence: NaiveDate,
}

/// The device alarm manager.
#[async_trait]
pub trait AlarmService: Send + Sync {
    /// Whether exact-time alarms may be set.
    async fn exact_alarms_permitted(&self) -> bool;

    /// Set an alarm, replacing any alarm with the same key.
    async fn schedule(&self, alarm: &Alarm) -> AppResult<()>;

    /// Remove an alarm. Unknown keys are ignored.
    async fn cancel(&self, key: AlarmKey) -> AppResult<()>;

    async fn cancel_many(&self, keys: &[AlarmKey]) -> AppResult<()> {
        for key in keys {
            self.cancel(*key).await?;
        }
        Ok(())
    }

    /// Alarms whose trigger time is at or before `now`, earliest first.
    async fn due(&self, now: NaiveDateTime) -> AppResult<Vec<Alarm>>;

    /// Alarms currently set for one record, by offset.
    async fn scheduled_for(&self, record_id: i64) -> AppResult<Vec<Alarm>>;
}

/// The device notification surface.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Whether the user allowed notifications for this app.
    fn permission_granted(&self) -> bool;

    async fn post(&self, title: &str, body: &str) -> AppResult<()>;
}

/// Prints notifications to stdout; stands in for the notification shade in the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn permission_granted(&self) -> bool {
        true
    }

    async fn post(&self, title: &str, body: &str) -> AppResult<()> {
        println!("{title}\n  {body}");
        Ok(())
    }
}
