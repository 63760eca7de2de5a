//! The single entry point for record operations: validation, storage, error
//! translation and keeping reminders in step with every write.

use chrono::NaiveDate;
use serde::Serialize;

use crate::dao::{self, BirthdayQuery};
use crate::model::{Birthday, BirthdayPatch, NewBirthday};
use crate::notifications::{NotificationScheduler, RescheduleSummary, ScheduleOutcome};
use crate::occurrence::{days_until, next_occurrence, sort_upcoming, upcoming_age};
use crate::settings::{self, ReminderSettings};
use crate::store::{Store, Subscription};
use crate::validation::{validate_birthday, validate_new};
use crate::zodiac::ZodiacSign;
use crate::{AppError, AppResult};

/// A write that went through, plus what happened to its reminders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Saved {
    pub record: Birthday,
    pub schedule: ScheduleOutcome,
}

/// A record with the values the list and detail views derive from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingBirthday {
    pub record: Birthday,
    pub next_occurrence: Option<NaiveDate>,
    pub days_until: Option<i64>,
    /// Age reached on the next occurrence; `None` when the year is unknown.
    pub turning: Option<i32>,
    pub zodiac: ZodiacSign,
}

impl UpcomingBirthday {
    pub fn derive(record: Birthday, today: NaiveDate) -> Self {
        let next = next_occurrence(record.birth_date, today).ok();
        let days = days_until(record.birth_date, today).ok();
        let turning = (record.year_known() && next.is_some())
            .then(|| upcoming_age(record.birth_date, today));
        let zodiac = ZodiacSign::for_date(record.birth_date);
        Self {
            record,
            next_occurrence: next,
            days_until: days,
            turning,
            zodiac,
        }
    }
}

/// Log the technical detail of a storage failure and hand back the typed error.
pub(crate) fn storage_error(operation: &'static str, err: sqlx::Error) -> AppError {
    let app = AppError::from(err).with_context("operation", operation);
    app.log_with_event("storage_error");
    app
}

#[derive(Clone)]
pub struct BirthdayRepository {
    store: Store,
    scheduler: NotificationScheduler,
}

impl BirthdayRepository {
    pub fn new(store: Store, scheduler: NotificationScheduler) -> Self {
        Self { store, scheduler }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn scheduler(&self) -> &NotificationScheduler {
        &self.scheduler
    }

    fn today(&self) -> NaiveDate {
        self.scheduler.clock().today()
    }

    pub async fn settings(&self) -> AppResult<ReminderSettings> {
        settings::load(self.store.pool()).await
    }

    async fn schedule(&self, record: &Birthday) -> ScheduleOutcome {
        match self.settings().await {
            Ok(settings) => self.scheduler.reschedule(record, &settings).await,
            Err(err) => ScheduleOutcome::Failed {
                message: err.to_string(),
            },
        }
    }

    /// Create a record from the add flow.
    pub async fn add(&self, input: NewBirthday) -> AppResult<Saved> {
        let birth_date = validate_new(&input, self.today())?;
        let mut record = input.into_record(birth_date, self.scheduler.clock().now_utc());
        let id = self
            .store
            .insert(&record)
            .await
            .map_err(|e| storage_error("insert", e))?;
        record.id = id;
        tracing::info!(target: "birthdays", event = "birthday_added", id);
        let schedule = self.schedule(&record).await;
        Ok(Saved { record, schedule })
    }

    /// Insert when unsaved, otherwise overwrite the stored record.
    pub async fn save(&self, mut record: Birthday) -> AppResult<Saved> {
        validate_birthday(&record, self.today())?;
        if record.is_saved() {
            let touched = self
                .store
                .update(&record)
                .await
                .map_err(|e| storage_error("update", e))?;
            if touched == 0 {
                return Err(AppError::not_found("Birthday", record.id));
            }
            tracing::info!(target: "birthdays", event = "birthday_updated", id = record.id);
        } else {
            record.id = self
                .store
                .insert(&record)
                .await
                .map_err(|e| storage_error("insert", e))?;
            tracing::info!(target: "birthdays", event = "birthday_added", id = record.id);
        }
        let schedule = self.schedule(&record).await;
        Ok(Saved { record, schedule })
    }

    /// Apply an edit to the stored record.
    pub async fn update(&self, id: i64, patch: BirthdayPatch) -> AppResult<Saved> {
        let mut record = self.get(id).await?;
        patch.apply(&mut record);
        self.save(record).await
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let touched = self
            .store
            .delete(id)
            .await
            .map_err(|e| storage_error("delete", e))?;
        if touched == 0 {
            return Err(AppError::not_found("Birthday", id));
        }
        tracing::info!(target: "birthdays", event = "birthday_deleted", id);
        if let Err(err) = self.scheduler.cancel(id).await {
            tracing::warn!(target: "birthdays", event = "alarms_cancel_failed", id, error = %err);
        }
        Ok(())
    }

    pub async fn set_pinned(&self, id: i64, pinned: bool) -> AppResult<()> {
        let touched = self
            .store
            .set_pinned(id, pinned)
            .await
            .map_err(|e| storage_error("set_pinned", e))?;
        if touched == 0 {
            return Err(AppError::not_found("Birthday", id));
        }
        Ok(())
    }

    pub async fn get(&self, id: i64) -> AppResult<Birthday> {
        self.store
            .get(id)
            .await
            .map_err(|e| storage_error("get", e))?
            .ok_or_else(|| AppError::not_found("Birthday", id))
    }

    pub async fn list(&self, query: &BirthdayQuery) -> AppResult<Vec<Birthday>> {
        self.store
            .list(query)
            .await
            .map_err(|e| storage_error("list", e))
    }

    pub async fn all(&self) -> AppResult<Vec<Birthday>> {
        self.list(&BirthdayQuery::All).await
    }

    pub async fn search(&self, term: &str) -> AppResult<Vec<Birthday>> {
        self.list(&BirthdayQuery::Search(term.to_string())).await
    }

    pub async fn in_month(&self, month: u32) -> AppResult<Vec<Birthday>> {
        if !(1..=12).contains(&month) {
            return Err(AppError::validation(vec![crate::error::FieldError::new(
                "month",
                "Month must be between 1 and 12",
            )]));
        }
        self.list(&BirthdayQuery::Month(month)).await
    }

    /// Every record ordered for the home screen: pinned, then soonest, then name.
    /// `within_days` keeps only birthdays at most that many days away.
    pub async fn upcoming(&self, within_days: Option<i64>) -> AppResult<Vec<UpcomingBirthday>> {
        let today = self.today();
        let mut records = self.all().await?;
        sort_upcoming(&mut records, today);
        Ok(records
            .into_iter()
            .map(|r| UpcomingBirthday::derive(r, today))
            .filter(|u| match (within_days, u.days_until) {
                (Some(limit), Some(days)) => days <= limit,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .collect())
    }

    /// Live results of `query`, re-pushed after every write.
    pub fn subscribe(&self, query: BirthdayQuery) -> Subscription {
        self.store.subscribe(query)
    }

    /// Rebuild every reminder from the stored records; the boot path.
    pub async fn reschedule_all(&self) -> AppResult<RescheduleSummary> {
        let settings = self.settings().await?;
        let records = self.all().await?;
        Ok(self.scheduler.reschedule_all(&records, &settings).await)
    }

    /// Post every reminder that has come due, then arm each record's next cycle.
    /// Returns the number of notifications posted.
    pub async fn deliver_due(&self) -> AppResult<usize> {
        let settings = self.settings().await?;
        let mut posted = 0;
        for alarm in self.scheduler.due_now().await? {
            let record = dao::get(self.store.pool(), alarm.key.record_id)
                .await
                .map_err(|e| storage_error("get", e))?;
            if self.scheduler.deliver(&alarm, record.as_ref()).await? {
                posted += 1;
            }
            if let Some(record) = record {
                // Only re-arm once the last reminder of this cycle is gone.
                let remaining = self.scheduler.alarms().scheduled_for(record.id).await?;
                if remaining.is_empty() {
                    self.scheduler.reschedule(&record, &settings).await;
                }
            }
        }
        Ok(posted)
    }
}
