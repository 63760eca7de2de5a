//! Offline birthday tracking with local reminder scheduling.

use std::path::Path;
use std::sync::Arc;

use sqlx::SqlitePool;

pub mod backup;
pub mod config;
pub mod dao;
pub mod db;
pub mod error;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod notifications;
pub mod occurrence;
pub mod repository;
pub mod settings;
pub mod store;
pub mod time;
pub mod validation;
pub mod zodiac;

pub use error::{AppError, AppResult, ErrorKind, FieldError, UiAction, UiError};
pub use logging::init_logging;
pub use model::{Birthday, BirthdayPatch, NewBirthday};
pub use repository::{BirthdayRepository, Saved, UpcomingBirthday};

use notifications::{AlarmService, NotificationScheduler, Notifier};
use store::Store;
use time::Clock;

/// Wire a repository over an already-migrated pool.
pub fn build_repository(
    pool: SqlitePool,
    alarms: Arc<dyn AlarmService>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
) -> BirthdayRepository {
    let scheduler = NotificationScheduler::new(alarms, notifier, clock);
    BirthdayRepository::new(Store::new(pool), scheduler)
}

/// Open the database at `db_path`, bring its schema up to date and return the pool.
pub async fn open_database(db_path: &Path) -> AppResult<SqlitePool> {
    let pool = db::open_sqlite_pool(db_path).await?;
    if let Err(err) = migrate::apply_migrations(&pool).await {
        let err = AppError::from(err);
        err.log_with_event("migration_failed");
        pool.close().await;
        return Err(err);
    }
    Ok(pool)
}
