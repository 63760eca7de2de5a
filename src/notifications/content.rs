use chrono::NaiveDate;

use super::Alarm;
use crate::model::Birthday;
use crate::occurrence::upcoming_age;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderContent {
    pub title: String,
    pub body: String,
}

/// Notification text for `alarm`. The age is included only when the birth year is real.
pub fn reminder_content(record: &Birthday, alarm: &Alarm) -> ReminderContent {
    let name = record.name.as_str();
    let days = alarm.key.offset_days;
    let age = record
        .year_known()
        .then(|| upcoming_age(record.birth_date, day_before(alarm.occurrence)));

    let title = match days {
        0 => format!("Today is {name}'s birthday"),
        1 => format!("{name}'s birthday is tomorrow"),
        n => format!("{name}'s birthday is in {n} days"),
    };

    let when = alarm.occurrence.format("%A, %B %-d");
    let body = match (days, age) {
        (0, Some(age)) => format!("{name} turns {age} today."),
        (0, None) => "Don't forget to send your wishes.".to_string(),
        (_, Some(age)) => format!("{name} turns {age} on {when}."),
        (_, None) => format!("Coming up on {when}."),
    };

    ReminderContent { title, body }
}

// The age reached on the occurrence, computed from the day before so the
// same-day rule does not hold it back.
fn day_before(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(date)
}
