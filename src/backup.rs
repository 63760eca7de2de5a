//! JSON backup of every record, and restore with a conflict strategy.
//!
//! A restore parses and validates the whole document before it touches the
//! database, then applies every write in one transaction. Reminders are
//! rescheduled only once that transaction has committed.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao;
use crate::db::write_atomic;
use crate::model::{created_at, Birthday, UNSAVED_ID};
use crate::notifications::ScheduleOutcome;
use crate::repository::{storage_error, BirthdayRepository};
use crate::store::StoreChange;
use crate::validation::validate_birthday;
use crate::{AppError, AppResult};

/// Format version written by this build; newer documents are refused.
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// How an imported record treats a stored record with the same identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImportStrategy {
    /// Keep the stored record; import non-colliding records under fresh identifiers.
    Skip,
    /// Replace the stored record with the imported one, identifier included.
    Overwrite,
    /// Copy the imported fields onto the stored record, keeping its identifier.
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub version: u32,
    #[serde(with = "created_at")]
    pub export_date: DateTime<Utc>,
    pub birthdays: Vec<Birthday>,
}

impl BackupDocument {
    pub fn new(birthdays: Vec<Birthday>, export_date: DateTime<Utc>) -> Self {
        Self {
            version: BACKUP_FORMAT_VERSION,
            export_date,
            birthdays,
        }
    }

    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a backup. Unknown fields are ignored; any malformed record fails the
    /// whole document with the index of the offending entry.
    pub fn parse(text: &str) -> AppResult<Self> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawDocument {
            version: u32,
            export_date: String,
            birthdays: Vec<Value>,
        }

        let raw: RawDocument = serde_json::from_str(text).map_err(|e| {
            AppError::backup_parse(format!("Not a birthday backup: {e}")).with_cause(e)
        })?;

        if raw.version > BACKUP_FORMAT_VERSION {
            return Err(AppError::backup_parse(format!(
                "Backup format {} is newer than this app supports ({BACKUP_FORMAT_VERSION})",
                raw.version
            ))
            .with_context("version", raw.version.to_string()));
        }

        let export_date = created_at::parse(&raw.export_date).ok_or_else(|| {
            AppError::backup_parse(format!("Invalid exportDate: {}", raw.export_date))
        })?;

        let birthdays = raw
            .birthdays
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                serde_json::from_value::<Birthday>(value).map_err(|e| {
                    AppError::backup_parse(format!("Record {index} is malformed: {e}"))
                        .with_context("index", index.to_string())
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            version: raw.version,
            export_date,
            birthdays,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Records added under a fresh identifier.
    pub inserted: usize,
    /// Records written over a stored record with the same identifier.
    pub replaced: usize,
    /// Stored records updated in place from the backup.
    pub merged: usize,
    /// Records left out because the identifier was taken.
    pub skipped: usize,
    pub schedules: Vec<(i64, ScheduleOutcome)>,
}

impl ImportReport {
    /// Records successfully imported.
    pub fn imported(&self) -> usize {
        self.inserted + self.replaced + self.merged
    }
}

pub async fn export_document(repo: &BirthdayRepository) -> AppResult<BackupDocument> {
    let records = repo.all().await?;
    Ok(BackupDocument::new(
        records,
        repo.scheduler().clock().now_utc(),
    ))
}

/// Write every record to `path`, replacing the file atomically.
pub async fn export_to_file(repo: &BirthdayRepository, path: &Path) -> AppResult<usize> {
    let doc = export_document(repo).await?;
    let json = doc.to_json()?;
    write_atomic(path, json.as_bytes()).map_err(|e| {
        AppError::from(e).with_context("path", path.display().to_string())
    })?;
    tracing::info!(
        target: "birthdays",
        event = "backup_exported",
        path = %path.display(),
        records = doc.birthdays.len()
    );
    Ok(doc.birthdays.len())
}

pub async fn import_from_file(
    repo: &BirthdayRepository,
    path: &Path,
    strategy: ImportStrategy,
) -> AppResult<ImportReport> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::from(e).with_context("path", path.display().to_string()))?;
    import_json(repo, &text, strategy).await
}

pub async fn import_json(
    repo: &BirthdayRepository,
    text: &str,
    strategy: ImportStrategy,
) -> AppResult<ImportReport> {
    let doc = BackupDocument::parse(text)?;
    import_document(repo, doc, strategy).await
}

enum Applied {
    Inserted(Birthday),
    Replaced(Birthday),
    Merged(Birthday),
    Skipped,
}

pub async fn import_document(
    repo: &BirthdayRepository,
    doc: BackupDocument,
    strategy: ImportStrategy,
) -> AppResult<ImportReport> {
    let today = repo.scheduler().clock().today();
    for (index, record) in doc.birthdays.iter().enumerate() {
        validate_birthday(record, today).map_err(|err| {
            AppError::backup_parse(format!("Record {index} is invalid: {}", err.message()))
                .with_context("index", index.to_string())
                .with_cause(err)
        })?;
    }

    let pool = repo.store().pool();
    tracing::info!(target: "birthdays", event = "db_tx_begin", op = "import");
    let mut tx = pool.begin().await.map_err(|e| storage_error("import", e))?;

    // Collisions are decided against the rows stored before this import only.
    let stored: HashSet<i64> = sqlx::query_scalar::<_, i64>("SELECT id FROM birthdays")
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| storage_error("import", e))?
        .into_iter()
        .collect();

    // Records keeping their identifier go first so a fresh identifier can never
    // take one that a later record claims.
    let (fresh, keyed): (Vec<Birthday>, Vec<Birthday>) = doc
        .birthdays
        .into_iter()
        .partition(|record| record.id == UNSAVED_ID || strategy != ImportStrategy::Overwrite);
    let mut claimed = HashSet::new();
    let mut applied = Vec::with_capacity(fresh.len() + keyed.len());

    for record in keyed {
        let taken = stored.contains(&record.id) || !claimed.insert(record.id);
        if taken {
            dao::delete(&mut *tx, record.id)
                .await
                .map_err(|e| storage_error("import", e))?;
        }
        dao::insert_with_id(&mut *tx, &record)
            .await
            .map_err(|e| storage_error("import", e))?;
        applied.push(if taken {
            Applied::Replaced(record)
        } else {
            Applied::Inserted(record)
        });
    }

    for mut record in fresh {
        let existing = if stored.contains(&record.id) {
            dao::get(&mut *tx, record.id)
                .await
                .map_err(|e| storage_error("import", e))?
        } else {
            None
        };
        let outcome = match (strategy, existing) {
            (ImportStrategy::Skip, Some(_)) => Applied::Skipped,
            (ImportStrategy::Merge, Some(mut current)) => {
                current.merge_from(&record);
                dao::update(&mut *tx, &current)
                    .await
                    .map_err(|e| storage_error("import", e))?;
                Applied::Merged(current)
            }
            (_, _) => {
                record.id = dao::insert(&mut *tx, &record)
                    .await
                    .map_err(|e| storage_error("import", e))?;
                Applied::Inserted(record)
            }
        };
        applied.push(outcome);
    }

    if let Err(err) = tx.commit().await {
        tracing::warn!(target: "birthdays", event = "db_tx_rollback", op = "import");
        return Err(storage_error("import", err));
    }
    tracing::info!(target: "birthdays", event = "db_tx_commit", op = "import");
    repo.store().publish(StoreChange::Bulk);

    let settings = repo.settings().await?;
    let mut report = ImportReport::default();
    for outcome in applied {
        let record = match outcome {
            Applied::Inserted(r) => {
                report.inserted += 1;
                r
            }
            Applied::Replaced(r) => {
                report.replaced += 1;
                r
            }
            Applied::Merged(r) => {
                report.merged += 1;
                r
            }
            Applied::Skipped => {
                report.skipped += 1;
                continue;
            }
        };
        let schedule = repo.scheduler().reschedule(&record, &settings).await;
        report.schedules.push((record.id, schedule));
    }

    tracing::info!(
        target: "birthdays",
        event = "backup_imported",
        strategy = ?strategy,
        imported = report.imported(),
        skipped = report.skipped
    );
    Ok(report)
}
