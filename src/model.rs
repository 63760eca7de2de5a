//! The birthday record and the input shapes used by the add and edit flows.
//!
//! Field names serialize in camelCase so a record is also a backup entry.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Reminder time used when a record carries neither a specific nor a legacy time.
pub const DEFAULT_REMINDER_TIME: (u32, u32) = (9, 0);

/// Identifier of a record that has not been inserted yet.
pub const UNSAVED_ID: i64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Birthday {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub advance_notification_days: u32,
    #[serde(default)]
    pub notification_hour: Option<u32>,
    #[serde(default)]
    pub notification_minute: Option<u32>,
    #[serde(default)]
    pub image_uri: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub notification_offsets: Vec<u32>,
    #[serde(default, with = "time_of_day")]
    pub notification_time: Option<NaiveTime>,
    #[serde(default = "Utc::now", with = "created_at")]
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Birthday {
    pub fn is_saved(&self) -> bool {
        self.id != UNSAVED_ID
    }

    /// Specific time wins over the legacy hour/minute pair, which wins over `default`.
    pub fn effective_time(&self, default: NaiveTime) -> NaiveTime {
        if let Some(time) = self.notification_time {
            return time;
        }
        match (self.notification_hour, self.notification_minute) {
            (Some(hour), minute) => {
                NaiveTime::from_hms_opt(hour, minute.unwrap_or(0), 0).unwrap_or(default)
            }
            _ => default,
        }
    }

    /// Sorted, de-duplicated offsets. An empty set falls back to the legacy advance days.
    pub fn effective_offsets(&self) -> Vec<u32> {
        if self.notification_offsets.is_empty() {
            return vec![self.advance_notification_days];
        }
        let mut offsets = self.notification_offsets.clone();
        offsets.sort_unstable();
        offsets.dedup();
        offsets
    }

    /// Copy the user-editable fields of `other`, keeping this record's identity.
    pub fn merge_from(&mut self, other: &Birthday) {
        self.name = other.name.clone();
        self.birth_date = other.birth_date;
        self.notes = other.notes.clone();
        self.notifications_enabled = other.notifications_enabled;
        self.advance_notification_days = other.advance_notification_days;
        self.notification_hour = other.notification_hour;
        self.notification_minute = other.notification_minute;
        self.notification_offsets = other.notification_offsets.clone();
        self.notification_time = other.notification_time;
    }

    /// Whether the stored year is a real birth year rather than the placeholder.
    pub fn year_known(&self) -> bool {
        self.birth_date.year() != PLACEHOLDER_YEAR
    }
}

/// Leap year used to store month/day when the birth year is unknown.
pub const PLACEHOLDER_YEAR: i32 = 1904;

/// Input of the add flow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewBirthday {
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub notifications_enabled: bool,
    pub notification_offsets: Vec<u32>,
    pub notification_time: Option<NaiveTime>,
    pub image_uri: Option<String>,
    pub relationship: Option<String>,
    pub is_pinned: bool,
}

impl NewBirthday {
    pub fn new(name: impl Into<String>, birth_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            birth_date: Some(birth_date),
            notifications_enabled: true,
            ..Default::default()
        }
    }

    pub fn into_record(self, birth_date: NaiveDate, created_at: DateTime<Utc>) -> Birthday {
        Birthday {
            id: UNSAVED_ID,
            name: self.name.trim().to_string(),
            birth_date,
            notes: self.notes.filter(|n| !n.trim().is_empty()),
            notifications_enabled: self.notifications_enabled,
            advance_notification_days: 0,
            notification_hour: self.notification_time.map(|t| t.hour()),
            notification_minute: self.notification_time.map(|t| t.minute()),
            image_uri: self.image_uri,
            relationship: self.relationship.filter(|r| !r.trim().is_empty()),
            is_pinned: self.is_pinned,
            notification_offsets: self.notification_offsets,
            notification_time: self.notification_time,
            created_at,
        }
    }
}

/// Partial update from the edit flow; `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BirthdayPatch {
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub notes: Option<Option<String>>,
    pub notifications_enabled: Option<bool>,
    pub notification_offsets: Option<Vec<u32>>,
    pub notification_time: Option<Option<NaiveTime>>,
    pub image_uri: Option<Option<String>>,
    pub relationship: Option<Option<String>>,
    pub is_pinned: Option<bool>,
}

impl BirthdayPatch {
    pub fn is_empty(&self) -> bool {
        self == &BirthdayPatch::default()
    }

    pub fn apply(self, record: &mut Birthday) {
        if let Some(name) = self.name {
            record.name = name.trim().to_string();
        }
        if let Some(date) = self.birth_date {
            record.birth_date = date;
        }
        if let Some(notes) = self.notes {
            record.notes = notes.filter(|n| !n.trim().is_empty());
        }
        if let Some(enabled) = self.notifications_enabled {
            record.notifications_enabled = enabled;
        }
        if let Some(offsets) = self.notification_offsets {
            record.notification_offsets = offsets;
        }
        if let Some(time) = self.notification_time {
            record.notification_time = time;
            record.notification_hour = time.map(|t| t.hour());
            record.notification_minute = time.map(|t| t.minute());
        }
        if let Some(uri) = self.image_uri {
            record.image_uri = uri;
        }
        if let Some(relationship) = self.relationship {
            record.relationship = relationship.filter(|r| !r.trim().is_empty());
        }
        if let Some(pinned) = self.is_pinned {
            record.is_pinned = pinned;
        }
    }
}

/// `HH:MM` on output, `HH:MM` or `HH:MM:SS` on input.
pub(crate) mod time_of_day {
    use chrono::{NaiveTime, Timelike};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn format(time: &NaiveTime) -> String {
        if time.second() == 0 {
            time.format("%H:%M").to_string()
        } else {
            time.format("%H:%M:%S").to_string()
        }
    }

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
            .ok()
    }

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => s.serialize_some(&format(time)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            None => Ok(None),
            Some(text) => parse(&text)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid time of day: {text}"))),
        }
    }
}

/// RFC 3339 on output; RFC 3339 or a zone-less ISO datetime (read as UTC) on input.
pub(crate) mod created_at {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Birthday {
        NewBirthday::new("Ada", NaiveDate::from_ymd_opt(1990, 12, 10).unwrap())
            .into_record(
                NaiveDate::from_ymd_opt(1990, 12, 10).unwrap(),
                DateTime::<Utc>::UNIX_EPOCH,
            )
    }

    #[test]
    fn specific_time_wins_over_legacy_pair() {
        let mut b = sample();
        b.notification_hour = Some(7);
        b.notification_minute = Some(15);
        b.notification_time = NaiveTime::from_hms_opt(20, 0, 0);
        let default = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(b.effective_time(default), NaiveTime::from_hms_opt(20, 0, 0).unwrap());

        b.notification_time = None;
        assert_eq!(b.effective_time(default), NaiveTime::from_hms_opt(7, 15, 0).unwrap());

        b.notification_hour = None;
        assert_eq!(b.effective_time(default), default);
    }

    #[test]
    fn empty_offsets_fall_back_to_advance_days() {
        let mut b = sample();
        b.advance_notification_days = 2;
        assert_eq!(b.effective_offsets(), vec![2]);

        b.notification_offsets = vec![7, 0, 7, 3];
        assert_eq!(b.effective_offsets(), vec![0, 3, 7]);
    }

    #[test]
    fn reads_backup_entry_and_ignores_unknown_fields() {
        let value = json!({
            "id": 4,
            "name": "Grace",
            "birthDate": "1906-12-09",
            "notificationsEnabled": false,
            "advanceNotificationDays": 1,
            "notificationHour": 8,
            "notificationMinute": 30,
            "isPinned": true,
            "notificationOffsets": [0, 7],
            "notificationTime": "08:00",
            "createdAt": "2024-03-01T10:15:00",
            "favouriteColour": "green"
        });
        let b: Birthday = serde_json::from_value(value).expect("parse entry");
        assert_eq!(b.id, 4);
        assert_eq!(b.notification_time, NaiveTime::from_hms_opt(8, 0, 0));
        assert_eq!(b.created_at.to_rfc3339(), "2024-03-01T10:15:00+00:00");
        assert!(b.is_pinned);
        assert!(b.notes.is_none());
    }

    #[test]
    fn writes_every_field() {
        let value = serde_json::to_value(sample()).unwrap();
        for key in [
            "id",
            "name",
            "birthDate",
            "notes",
            "notificationsEnabled",
            "advanceNotificationDays",
            "notificationHour",
            "notificationMinute",
            "imageUri",
            "relationship",
            "isPinned",
            "notificationOffsets",
            "notificationTime",
            "createdAt",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["birthDate"], "1990-12-10");
    }

    #[test]
    fn patch_updates_only_given_fields() {
        let mut b = sample();
        BirthdayPatch {
            notes: Some(Some("likes tea".into())),
            notification_time: Some(NaiveTime::from_hms_opt(18, 45, 0)),
            ..Default::default()
        }
        .apply(&mut b);
        assert_eq!(b.name, "Ada");
        assert_eq!(b.notes.as_deref(), Some("likes tea"));
        assert_eq!(b.notification_hour, Some(18));
        assert_eq!(b.notification_minute, Some(45));
    }
}
