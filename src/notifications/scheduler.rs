use std::sync::Arc;

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use super::{reminder_content, Alarm, AlarmKey, AlarmService, Notifier};
use crate::model::Birthday;
use crate::occurrence::{next_occurrence, next_occurrence_after, OccurrenceError};
use crate::settings::ReminderSettings;
use crate::time::Clock;
use crate::validation::MAX_OFFSET_DAYS;
use crate::{AppError, AppResult};

/// What happened when a record's reminders were (re)armed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    /// Alarms armed for the next cycle.
    Scheduled { alarms: Vec<Alarm> },
    /// The record has reminders switched off; its alarms were removed.
    Cancelled,
    /// Exact alarms are not allowed on this device.
    PermissionNotGranted,
    /// Notifications are off for the whole app.
    NotificationsDisabled,
    /// Scheduling failed; the record itself is unaffected.
    Failed { message: String },
}

impl ScheduleOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, ScheduleOutcome::Scheduled { .. })
    }

    /// The outcome as an error, for callers that surface it. Successful and
    /// intentionally-off outcomes yield `None`.
    pub fn as_error(&self) -> Option<AppError> {
        match self {
            ScheduleOutcome::PermissionNotGranted => Some(AppError::new(
                "PERMISSION/EXACT_ALARM",
                "Exact alarms are not permitted; reminders were not scheduled",
            )),
            ScheduleOutcome::NotificationsDisabled => Some(AppError::new(
                "PERMISSION/NOTIFICATIONS_DISABLED",
                "Notifications are disabled; reminders were not scheduled",
            )),
            ScheduleOutcome::Failed { message } => {
                Some(AppError::new("SCHEDULER/FAILED", message.clone()))
            }
            ScheduleOutcome::Scheduled { .. } | ScheduleOutcome::Cancelled => None,
        }
    }
}

/// Tally of a boot-time rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RescheduleSummary {
    pub records: usize,
    pub alarms: usize,
    pub failed: usize,
    pub blocked: usize,
}

/// Alarms for the next cycle of `record` as seen at `now`.
///
/// The cycle is the first occurrence on or after today whose reminder moment is
/// still ahead; once today's moment has passed, the following occurrence. Each
/// offset yields one alarm at the reminder time that many days earlier, and
/// alarms whose moment is not after `now` are dropped. When that leaves nothing
/// for the cycle, the following cycle is planned instead.
pub fn plan_alarms(
    record: &Birthday,
    now: NaiveDateTime,
    default_time: NaiveTime,
) -> Result<Vec<Alarm>, OccurrenceError> {
    let time = record.effective_time(default_time);
    let mut occurrence = next_occurrence(record.birth_date, now.date())?;
    if occurrence.and_time(time) <= now {
        occurrence = next_occurrence_after(record.birth_date, occurrence)?;
    }

    let alarms = alarms_for_cycle(record, occurrence, time, now);
    if !alarms.is_empty() {
        return Ok(alarms);
    }
    let following = next_occurrence_after(record.birth_date, occurrence)?;
    Ok(alarms_for_cycle(record, following, time, now))
}

fn alarms_for_cycle(
    record: &Birthday,
    occurrence: NaiveDate,
    time: NaiveTime,
    now: NaiveDateTime,
) -> Vec<Alarm> {
    record
        .effective_offsets()
        .into_iter()
        .filter_map(|offset| {
            let day = occurrence.checked_sub_days(Days::new(u64::from(offset)))?;
            let trigger_at = day.and_time(time);
            (trigger_at > now).then_some(Alarm {
                key: AlarmKey::new(record.id, offset),
                trigger_at,
                occurrence,
            })
        })
        .collect()
}

/// Every key an alarm for `record_id` could have been set under.
fn all_keys(record_id: i64) -> Vec<AlarmKey> {
    (0..=MAX_OFFSET_DAYS)
        .map(|offset| AlarmKey::new(record_id, offset))
        .collect()
}

#[derive(Clone)]
pub struct NotificationScheduler {
    alarms: Arc<dyn AlarmService>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl NotificationScheduler {
    pub fn new(
        alarms: Arc<dyn AlarmService>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            alarms,
            notifier,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn alarms(&self) -> &Arc<dyn AlarmService> {
        &self.alarms
    }

    /// Remove every alarm the record could own.
    pub async fn cancel(&self, record_id: i64) -> AppResult<()> {
        self.alarms.cancel_many(&all_keys(record_id)).await?;
        tracing::debug!(target: "birthdays", event = "alarms_cancelled", record_id);
        Ok(())
    }

    /// Cancel whatever the record had, then arm the next cycle. Never fails;
    /// problems come back as an outcome.
    ///
    /// Triggers already in the past are skipped; when none of the coming
    /// cycle's triggers are left, the following year's cycle is armed instead.
    pub async fn reschedule(
        &self,
        record: &Birthday,
        settings: &ReminderSettings,
    ) -> ScheduleOutcome {
        let outcome = self.reschedule_inner(record, settings).await;
        match &outcome {
            ScheduleOutcome::Scheduled { alarms } => tracing::info!(
                target: "birthdays",
                event = "alarms_scheduled",
                record_id = record.id,
                count = alarms.len()
            ),
            ScheduleOutcome::Failed { message } => tracing::warn!(
                target: "birthdays",
                event = "alarms_schedule_failed",
                record_id = record.id,
                error = %message
            ),
            other => tracing::info!(
                target: "birthdays",
                event = "alarms_not_scheduled",
                record_id = record.id,
                outcome = ?other
            ),
        }
        outcome
    }

    async fn reschedule_inner(
        &self,
        record: &Birthday,
        settings: &ReminderSettings,
    ) -> ScheduleOutcome {
        if let Err(err) = self.cancel(record.id).await {
            return ScheduleOutcome::Failed {
                message: err.to_string(),
            };
        }
        if !record.notifications_enabled {
            return ScheduleOutcome::Cancelled;
        }
        if !settings.notifications_enabled || !self.notifier.permission_granted() {
            return ScheduleOutcome::NotificationsDisabled;
        }
        if !self.alarms.exact_alarms_permitted().await {
            return ScheduleOutcome::PermissionNotGranted;
        }

        let planned = match plan_alarms(record, self.clock.now_local(), settings.default_time) {
            Ok(planned) => planned,
            Err(err) => {
                return ScheduleOutcome::Failed {
                    message: err.to_string(),
                }
            }
        };
        for alarm in &planned {
            if let Err(err) = self.alarms.schedule(alarm).await {
                return ScheduleOutcome::Failed {
                    message: format!("alarm {}: {}", alarm.key, err),
                };
            }
        }
        ScheduleOutcome::Scheduled { alarms: planned }
    }

    /// Rebuild the alarm set from persisted records, e.g. after a reboot.
    pub async fn reschedule_all(
        &self,
        records: &[Birthday],
        settings: &ReminderSettings,
    ) -> RescheduleSummary {
        let mut summary = RescheduleSummary {
            records: records.len(),
            ..Default::default()
        };
        for record in records {
            match self.reschedule(record, settings).await {
                ScheduleOutcome::Scheduled { alarms } => summary.alarms += alarms.len(),
                ScheduleOutcome::Failed { .. } => summary.failed += 1,
                ScheduleOutcome::PermissionNotGranted | ScheduleOutcome::NotificationsDisabled => {
                    summary.blocked += 1
                }
                ScheduleOutcome::Cancelled => {}
            }
        }
        tracing::info!(
            target: "birthdays",
            event = "reschedule_all",
            records = summary.records,
            alarms = summary.alarms,
            failed = summary.failed,
            blocked = summary.blocked
        );
        summary
    }

    /// Alarms due at the clock's current time, earliest first.
    pub async fn due_now(&self) -> AppResult<Vec<Alarm>> {
        self.alarms.due(self.clock.now_local()).await
    }

    /// Disarm `alarm` and post its notification. An alarm whose record is gone
    /// is only disarmed. Returns whether a notification was posted.
    pub async fn deliver(&self, alarm: &Alarm, record: Option<&Birthday>) -> AppResult<bool> {
        self.alarms.cancel(alarm.key).await?;
        let Some(record) = record else {
            tracing::debug!(target: "birthdays", event = "alarm_orphaned", key = %alarm.key);
            return Ok(false);
        };
        let content = reminder_content(record, alarm);
        self.notifier.post(&content.title, &content.body).await?;
        tracing::info!(target: "birthdays", event = "reminder_posted", key = %alarm.key);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewBirthday;
    use chrono::{DateTime, Utc};

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn record(birth: NaiveDate, offsets: Vec<u32>, hour: u32) -> Birthday {
        let mut input = NewBirthday::new("Ann", birth);
        input.notification_offsets = offsets;
        input.notification_time = NaiveTime::from_hms_opt(hour, 0, 0);
        let mut b = input.into_record(birth, DateTime::<Utc>::UNIX_EPOCH);
        b.id = 1;
        b
    }

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn past_offset_trigger_is_skipped() {
        let b = record(NaiveDate::from_ymd_opt(1990, 6, 15).unwrap(), vec![0, 3], 8);
        let alarms = plan_alarms(&b, at(2024, 6, 13, 12), nine()).unwrap();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].key, AlarmKey::new(1, 0));
        assert_eq!(alarms[0].trigger_at, at(2024, 6, 15, 8));
    }

    #[test]
    fn passed_day_of_moment_moves_to_next_year() {
        let b = record(NaiveDate::from_ymd_opt(1990, 6, 15).unwrap(), vec![0, 3], 8);
        let alarms = plan_alarms(&b, at(2024, 6, 15, 10), nine()).unwrap();
        assert_eq!(
            alarms.iter().map(|a| a.trigger_at).collect::<Vec<_>>(),
            vec![at(2025, 6, 15, 8), at(2025, 6, 12, 8)]
        );
    }

    #[test]
    fn same_day_before_reminder_time_still_fires_today() {
        let b = record(NaiveDate::from_ymd_opt(1990, 6, 15).unwrap(), vec![0], 18);
        let alarms = plan_alarms(&b, at(2024, 6, 15, 10), nine()).unwrap();
        assert_eq!(alarms[0].trigger_at, at(2024, 6, 15, 18));
    }

    #[test]
    fn legacy_fields_drive_plan_when_offsets_empty() {
        let birth = NaiveDate::from_ymd_opt(1990, 6, 15).unwrap();
        let mut b = record(birth, vec![], 8);
        b.notification_time = None;
        b.notification_hour = Some(7);
        b.notification_minute = Some(30);
        b.advance_notification_days = 2;
        let alarms = plan_alarms(&b, at(2024, 6, 1, 0), nine()).unwrap();
        assert_eq!(alarms.len(), 1);
        assert_eq!(
            alarms[0].trigger_at,
            NaiveDate::from_ymd_opt(2024, 6, 13)
                .unwrap()
                .and_hms_opt(7, 30, 0)
                .unwrap()
        );
    }

    #[test]
    fn exhausted_cycle_arms_the_following_one() {
        let b = record(NaiveDate::from_ymd_opt(1990, 6, 15).unwrap(), vec![3], 8);
        let alarms = plan_alarms(&b, at(2024, 6, 13, 0), nine()).unwrap();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].trigger_at, at(2025, 6, 12, 8));
        assert_eq!(alarms[0].occurrence, NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
    }

    #[test]
    fn duplicate_offsets_yield_one_alarm() {
        let b = record(NaiveDate::from_ymd_opt(1990, 6, 15).unwrap(), vec![1, 1, 1], 8);
        assert_eq!(plan_alarms(&b, at(2024, 6, 1, 0), nine()).unwrap().len(), 1);
    }

    #[test]
    fn outcome_errors_are_permission_kinds() {
        use crate::error::ErrorKind;
        assert_eq!(
            ScheduleOutcome::PermissionNotGranted.as_error().unwrap().kind(),
            ErrorKind::Permission
        );
        assert!(ScheduleOutcome::Cancelled.as_error().is_none());
    }
}
