use chrono::NaiveDate;

use crate::error::{AppError, AppResult, FieldError};
use crate::model::{Birthday, NewBirthday};
use crate::occurrence::MIN_BIRTH_YEAR;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_NOTES_LEN: usize = 500;
pub const MAX_RELATIONSHIP_LEN: usize = 50;
pub const MAX_IMAGE_URI_LEN: usize = 2048;
/// Largest reminder offset, in days. Also bounds the cancellation sweep.
pub const MAX_OFFSET_DAYS: u32 = 365;

/// Check a record before it reaches the store. `today` bounds the birth date.
pub fn validate_birthday(record: &Birthday, today: NaiveDate) -> AppResult<()> {
    let mut errors = Vec::new();
    check_name(&record.name, &mut errors);
    check_birth_date(Some(record.birth_date), today, &mut errors);
    check_optional_len("notes", record.notes.as_deref(), MAX_NOTES_LEN, &mut errors);
    check_optional_len(
        "relationship",
        record.relationship.as_deref(),
        MAX_RELATIONSHIP_LEN,
        &mut errors,
    );
    check_optional_len(
        "image_uri",
        record.image_uri.as_deref(),
        MAX_IMAGE_URI_LEN,
        &mut errors,
    );

    match (record.notification_hour, record.notification_minute) {
        (Some(hour), _) if hour > 23 => errors.push(FieldError::new(
            "notification_hour",
            "Hour must be between 0 and 23",
        )),
        (_, Some(minute)) if minute > 59 => errors.push(FieldError::new(
            "notification_minute",
            "Minute must be between 0 and 59",
        )),
        (None, Some(_)) => errors.push(FieldError::new(
            "notification_hour",
            "Hour is required when a minute is set",
        )),
        _ => {}
    }

    if record.advance_notification_days > MAX_OFFSET_DAYS {
        errors.push(FieldError::new(
            "advance_notification_days",
            format!("Advance notice can be at most {MAX_OFFSET_DAYS} days"),
        ));
    }
    check_offsets(&record.notification_offsets, &mut errors);

    finish(errors)
}

/// Check the add-flow input, including a missing birth date.
pub fn validate_new(input: &NewBirthday, today: NaiveDate) -> AppResult<NaiveDate> {
    let mut errors = Vec::new();
    check_name(&input.name, &mut errors);
    check_birth_date(input.birth_date, today, &mut errors);
    check_optional_len("notes", input.notes.as_deref(), MAX_NOTES_LEN, &mut errors);
    check_optional_len(
        "relationship",
        input.relationship.as_deref(),
        MAX_RELATIONSHIP_LEN,
        &mut errors,
    );
    check_optional_len(
        "image_uri",
        input.image_uri.as_deref(),
        MAX_IMAGE_URI_LEN,
        &mut errors,
    );
    check_offsets(&input.notification_offsets, &mut errors);
    finish(errors)?;
    input.birth_date.ok_or_else(|| {
        AppError::validation(vec![FieldError::new("birth_date", "Birth date is required")])
    })
}

fn finish(errors: Vec<FieldError>) -> AppResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(errors))
    }
}

fn check_name(name: &str, errors: &mut Vec<FieldError>) {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        errors.push(FieldError::new("name", "Name is required"));
    } else if trimmed.chars().count() > MAX_NAME_LEN {
        errors.push(FieldError::new(
            "name",
            format!("Name must be at most {MAX_NAME_LEN} characters"),
        ));
    }
}

fn check_birth_date(date: Option<NaiveDate>, today: NaiveDate, errors: &mut Vec<FieldError>) {
    use chrono::Datelike;

    match date {
        None => errors.push(FieldError::new("birth_date", "Birth date is required")),
        Some(date) if date.year() < MIN_BIRTH_YEAR => errors.push(FieldError::new(
            "birth_date",
            format!("Birth date must be in {MIN_BIRTH_YEAR} or later"),
        )),
        Some(date) if date > today => errors.push(FieldError::new(
            "birth_date",
            "Birth date cannot be in the future",
        )),
        Some(_) => {}
    }
}

fn check_optional_len(
    field: &'static str,
    value: Option<&str>,
    max: usize,
    errors: &mut Vec<FieldError>,
) {
    if let Some(value) = value {
        if value.chars().count() > max {
            errors.push(FieldError::new(
                field,
                format!("Must be at most {max} characters"),
            ));
        }
    }
}

fn check_offsets(offsets: &[u32], errors: &mut Vec<FieldError>) {
    if offsets.iter().any(|o| *o > MAX_OFFSET_DAYS) {
        errors.push(FieldError::new(
            "notification_offsets",
            format!("Reminders can be at most {MAX_OFFSET_DAYS} days ahead"),
        ));
    }
}
