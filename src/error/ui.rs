use serde::Serialize;

use super::{AppError, ErrorKind};

/// Button offered by an error dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UiAction {
    Retry,
    Cancel,
    Acknowledge,
}

/// What the user gets to see: a short message and whether retrying makes sense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiError {
    pub code: String,
    pub message: String,
    pub recoverable: bool,
}

impl UiError {
    pub fn actions(&self) -> &'static [UiAction] {
        if self.recoverable {
            &[UiAction::Retry, UiAction::Cancel]
        } else {
            &[UiAction::Acknowledge]
        }
    }
}

// SQLITE_BUSY and SQLITE_LOCKED; both clear up on their own.
const TRANSIENT_SQLITE_CODES: &[&str] = &["Sqlite/5", "Sqlite/6"];

fn storage_is_transient(code: &str) -> bool {
    TRANSIENT_SQLITE_CODES.contains(&code)
        || code == "SQLX/POOL_TIMEOUT"
        || code == "STORAGE/UNAVAILABLE"
        || code.starts_with("IO/")
}

impl AppError {
    /// Translate into the message shown to the user. Technical detail stays in the logs.
    pub fn user_facing(&self) -> UiError {
        let (message, recoverable) = match self.kind() {
            ErrorKind::Validation => (self.message.clone(), false),
            ErrorKind::NotFound => ("That birthday no longer exists.".to_string(), false),
            ErrorKind::Permission => (
                "Reminders need notification permission. Grant it and try again.".to_string(),
                true,
            ),
            ErrorKind::Parse => ("The backup file could not be read.".to_string(), false),
            ErrorKind::Storage if storage_is_transient(&self.code) => (
                "Your birthdays could not be saved right now.".to_string(),
                true,
            ),
            ErrorKind::Storage => ("Something went wrong with local storage.".to_string(), false),
            ErrorKind::Internal => ("Something went wrong.".to_string(), false),
        };
        UiError {
            code: self.code.clone(),
            message,
            recoverable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_database_offers_retry() {
        let ui = AppError::new("Sqlite/5", "database is locked").user_facing();
        assert!(ui.recoverable);
        assert_eq!(ui.actions(), &[UiAction::Retry, UiAction::Cancel]);
        assert!(!ui.message.contains("locked"));
    }

    #[test]
    fn constraint_failure_only_acknowledges() {
        let ui = AppError::new("Sqlite/2067", "UNIQUE constraint failed").user_facing();
        assert!(!ui.recoverable);
        assert_eq!(ui.actions(), &[UiAction::Acknowledge]);
    }

    #[test]
    fn validation_message_passes_through() {
        let ui = AppError::new("VALIDATION", "Name is required").user_facing();
        assert_eq!(ui.message, "Name is required");
        assert!(!ui.recoverable);
    }
}
