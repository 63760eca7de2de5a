//! Calendar arithmetic on birth dates: next occurrence, ages, list ordering.

use std::cmp::Ordering;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::model::Birthday;

/// Earliest birth year the calculator accepts.
pub const MIN_BIRTH_YEAR: i32 = 1900;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OccurrenceError {
    #[error("birth date {0} is before {MIN_BIRTH_YEAR}")]
    BirthDateOutOfRange(NaiveDate),
    #[error("no calendar date for year {0}")]
    YearOutOfRange(i32),
}

/// The birth month/day projected onto `year`. Feb 29 becomes Feb 28 in non-leap years.
pub fn project_onto_year(birth: NaiveDate, year: i32) -> Result<NaiveDate, OccurrenceError> {
    NaiveDate::from_ymd_opt(year, birth.month(), birth.day())
        .or_else(|| {
            if birth.month() == 2 && birth.day() == 29 {
                NaiveDate::from_ymd_opt(year, 2, 28)
            } else {
                None
            }
        })
        .ok_or(OccurrenceError::YearOutOfRange(year))
}

fn check_bounds(birth: NaiveDate) -> Result<(), OccurrenceError> {
    if birth.year() < MIN_BIRTH_YEAR {
        return Err(OccurrenceError::BirthDateOutOfRange(birth));
    }
    Ok(())
}

/// The first date on or after `today` whose month/day matches the birth date.
pub fn next_occurrence(birth: NaiveDate, today: NaiveDate) -> Result<NaiveDate, OccurrenceError> {
    check_bounds(birth)?;
    let this_year = project_onto_year(birth, today.year())?;
    if this_year >= today {
        Ok(this_year)
    } else {
        project_onto_year(birth, today.year() + 1)
    }
}

/// The first matching date strictly after `day`.
pub fn next_occurrence_after(
    birth: NaiveDate,
    day: NaiveDate,
) -> Result<NaiveDate, OccurrenceError> {
    check_bounds(birth)?;
    let this_year = project_onto_year(birth, day.year())?;
    if this_year > day {
        Ok(this_year)
    } else {
        project_onto_year(birth, day.year() + 1)
    }
}

pub fn days_until(birth: NaiveDate, today: NaiveDate) -> Result<i64, OccurrenceError> {
    Ok((next_occurrence(birth, today)? - today).num_days())
}

/// Whether `today` is the birthday, counting Feb 28 for Feb 29 births in non-leap years.
pub fn is_birthday(birth: NaiveDate, today: NaiveDate) -> bool {
    project_onto_year(birth, today.year())
        .map(|d| d == today)
        .unwrap_or(false)
}

/// Whole years elapsed since `birth`.
pub fn current_age(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    let had_birthday = project_onto_year(birth, today.year())
        .map(|d| d <= today)
        .unwrap_or(true);
    if !had_birthday {
        age -= 1;
    }
    age
}

/// The age reached on the next occurrence; equals the current age on the day itself.
pub fn upcoming_age(birth: NaiveDate, today: NaiveDate) -> i32 {
    let age = current_age(birth, today);
    if is_birthday(birth, today) {
        age
    } else {
        age + 1
    }
}

/// Pinned first, then soonest birthday (today counts as zero days), then name.
/// Records whose date the calculator rejects go last, ordered by name.
pub fn sort_upcoming(records: &mut [Birthday], today: NaiveDate) {
    records.sort_by(|a, b| compare_upcoming(a, b, today));
}

fn compare_upcoming(a: &Birthday, b: &Birthday, today: NaiveDate) -> Ordering {
    let pinned = b.is_pinned.cmp(&a.is_pinned);
    if pinned != Ordering::Equal {
        return pinned;
    }
    let days_a = days_until(a.birth_date, today).ok();
    let days_b = days_until(b.birth_date, today).ok();
    let by_days = match (days_a, days_b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_days.then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}
