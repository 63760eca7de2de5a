#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use birthdays_lib::backup::{self, BackupDocument, ImportStrategy};
use birthdays_lib::{ErrorKind, NewBirthday};
use serde_json::json;
use tempfile::tempdir;
use util::{at, date, harness, Harness};

async fn seeded() -> (Harness, i64) {
    let h = harness(at(2024, 3, 1, 9, 0)).await;
    let mut input = NewBirthday::new("Original", date(1980, 1, 2));
    input.notes = Some("keep me".into());
    input.relationship = Some("Friend".into());
    let saved = h.repo.add(input).await.unwrap();
    (h, saved.record.id)
}

fn backup_with(id: i64, name: &str) -> String {
    json!({
        "version": 1,
        "exportDate": "2024-02-01T10:00:00.000Z",
        "birthdays": [
            {
                "id": id,
                "name": name,
                "birthDate": "1981-03-04",
                "notes": "from backup",
                "notificationsEnabled": true,
                "advanceNotificationDays": 0,
                "notificationOffsets": [0, 2],
                "notificationTime": "10:30",
                "isPinned": true,
                "createdAt": "2020-01-01T00:00:00Z",
                "comesFromTheFuture": {"ignored": true}
            },
            {
                "id": 999,
                "name": "Fresh",
                "birthDate": "1970-08-09",
                "notificationsEnabled": false,
                "advanceNotificationDays": 1,
                "isPinned": false,
                "notificationOffsets": [],
                "createdAt": "2020-01-01T00:00:00Z"
            }
        ]
    })
    .to_string()
}

#[tokio::test]
async fn skip_leaves_colliding_record_untouched() {
    let (h, id) = seeded().await;
    let before = h.repo.get(id).await.unwrap();

    let report = backup::import_json(&h.repo, &backup_with(id, "Imported"), ImportStrategy::Skip)
        .await
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.imported(), 1);
    assert_eq!(h.repo.get(id).await.unwrap(), before);
    let names: Vec<String> = h.repo.all().await.unwrap().into_iter().map(|b| b.name).collect();
    assert_eq!(names, vec!["Fresh", "Original"]);
}

#[tokio::test]
async fn skip_assigns_fresh_identifiers() {
    let (h, _) = seeded().await;
    backup::import_json(&h.repo, &backup_with(5000, "Imported"), ImportStrategy::Skip)
        .await
        .unwrap();
    let ids: Vec<i64> = h.repo.all().await.unwrap().into_iter().map(|b| b.id).collect();
    assert!(!ids.contains(&5000));
    assert!(!ids.contains(&999));
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn overwrite_replaces_colliding_record() {
    let (h, id) = seeded().await;
    let report =
        backup::import_json(&h.repo, &backup_with(id, "Replaced"), ImportStrategy::Overwrite)
            .await
            .unwrap();
    assert_eq!(report.replaced, 1);
    assert_eq!(report.imported(), 2);

    let replaced = h.repo.get(id).await.unwrap();
    assert_eq!(replaced.name, "Replaced");
    assert_eq!(replaced.notes.as_deref(), Some("from backup"));
    assert_eq!(replaced.relationship, None);
    assert!(replaced.is_pinned);
    // The non-colliding record keeps its identifier too.
    assert_eq!(h.repo.get(999).await.unwrap().name, "Fresh");
}

#[tokio::test]
async fn merge_updates_fields_and_keeps_identifier() {
    let (h, id) = seeded().await;
    let report = backup::import_json(&h.repo, &backup_with(id, "Merged"), ImportStrategy::Merge)
        .await
        .unwrap();
    assert_eq!(report.merged, 1);
    assert_eq!(report.inserted, 1);

    let merged = h.repo.get(id).await.unwrap();
    assert_eq!(merged.id, id);
    assert_eq!(merged.name, "Merged");
    assert_eq!(merged.birth_date, date(1981, 3, 4));
    assert_eq!(merged.notes.as_deref(), Some("from backup"));
    assert_eq!(merged.notification_offsets, vec![0, 2]);
    // Profile fields are not part of a merge.
    assert_eq!(merged.relationship.as_deref(), Some("Friend"));
    assert!(!merged.is_pinned);
}

#[tokio::test]
async fn imported_records_get_reminders() {
    let (h, id) = seeded().await;
    h.alarms.snapshot().iter().for_each(|a| assert_eq!(a.key.record_id, id));
    backup::import_json(&h.repo, &backup_with(id, "Merged"), ImportStrategy::Merge)
        .await
        .unwrap();
    let offsets: Vec<u32> = h
        .alarms
        .snapshot()
        .iter()
        .filter(|a| a.key.record_id == id)
        .map(|a| a.key.offset_days)
        .collect();
    assert_eq!(offsets, vec![0, 2]);
}

#[tokio::test]
async fn malformed_document_writes_nothing() {
    let (h, id) = seeded().await;
    let bad = json!({
        "version": 1,
        "exportDate": "2024-02-01T10:00:00Z",
        "birthdays": [
            {"id": id, "name": "Would overwrite", "birthDate": "1981-03-04"},
            {"id": 77, "name": "Broken", "birthDate": "1981-13-40"}
        ]
    })
    .to_string();

    let err = backup::import_json(&h.repo, &bad, ImportStrategy::Overwrite)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(err.context().get("index").map(String::as_str), Some("1"));
    assert_eq!(h.repo.get(id).await.unwrap().name, "Original");
    assert_eq!(h.repo.all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_record_fails_the_whole_import() {
    let (h, _) = seeded().await;
    let bad = json!({
        "version": 1,
        "exportDate": "2024-02-01T10:00:00Z",
        "birthdays": [
            {"name": "Fine", "birthDate": "1981-03-04"},
            {"name": "", "birthDate": "1981-03-04"}
        ]
    })
    .to_string();
    let err = backup::import_json(&h.repo, &bad, ImportStrategy::Skip)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(h.repo.all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn export_then_import_into_empty_store() {
    let (h, _) = seeded().await;
    let dir = tempdir().unwrap();
    let path = dir.path().join("backup.json");
    assert_eq!(backup::export_to_file(&h.repo, &path).await.unwrap(), 1);

    let text = std::fs::read_to_string(&path).unwrap();
    let doc = BackupDocument::parse(&text).unwrap();
    assert_eq!(doc.version, backup::BACKUP_FORMAT_VERSION);
    assert_eq!(doc.birthdays[0].name, "Original");
    for key in ["version", "exportDate", "birthdays"] {
        assert!(text.contains(&format!("\"{key}\"")), "missing {key}");
    }

    let target = harness(at(2024, 3, 1, 9, 0)).await;
    let report = backup::import_from_file(&target.repo, &path, ImportStrategy::Overwrite)
        .await
        .unwrap();
    assert_eq!(report.imported(), 1);
    let restored = target.repo.all().await.unwrap();
    assert_eq!(restored[0].notes.as_deref(), Some("keep me"));
    assert_eq!(restored[0].id, doc.birthdays[0].id);
}

/// Bob is added before Alice, so the export (by name) lists ids out of order.
async fn bob_and_alice_backup() -> String {
    let source = harness(at(2024, 3, 1, 9, 0)).await;
    source.repo.add(NewBirthday::new("Bob", date(1970, 5, 6))).await.unwrap();
    source.repo.add(NewBirthday::new("Alice", date(1975, 8, 9))).await.unwrap();
    let doc = backup::export_document(&source.repo).await.unwrap();
    let ids: Vec<(i64, &str)> = doc.birthdays.iter().map(|b| (b.id, b.name.as_str())).collect();
    assert_eq!(ids, vec![(2, "Alice"), (1, "Bob")]);
    doc.to_json().unwrap()
}

#[tokio::test]
async fn restore_into_empty_store_keeps_every_record() {
    let json = bob_and_alice_backup().await;
    for strategy in [ImportStrategy::Skip, ImportStrategy::Merge, ImportStrategy::Overwrite] {
        let target = harness(at(2024, 3, 1, 9, 0)).await;
        let report = backup::import_json(&target.repo, &json, strategy).await.unwrap();
        assert_eq!(report.imported(), 2, "{strategy:?}");
        assert_eq!(report.inserted, 2, "{strategy:?}");
        assert_eq!(report.skipped + report.merged + report.replaced, 0, "{strategy:?}");

        let names: Vec<String> =
            target.repo.all().await.unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["Alice", "Bob"], "{strategy:?}");
    }
}

#[tokio::test]
async fn restoring_twice_collides_only_with_stored_records() {
    let json = bob_and_alice_backup().await;
    let target = harness(at(2024, 3, 1, 9, 0)).await;
    backup::import_json(&target.repo, &json, ImportStrategy::Overwrite)
        .await
        .unwrap();

    let again = backup::import_json(&target.repo, &json, ImportStrategy::Skip)
        .await
        .unwrap();
    assert_eq!(again.skipped, 2);
    assert_eq!(again.imported(), 0);

    let merged = backup::import_json(&target.repo, &json, ImportStrategy::Merge)
        .await
        .unwrap();
    assert_eq!(merged.merged, 2);
    assert_eq!(target.repo.all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn overwrite_keeps_ids_claimed_later_in_the_document() {
    let h = harness(at(2024, 3, 1, 9, 0)).await;
    let doc = json!({
        "version": 1,
        "exportDate": "2024-02-01T10:00:00Z",
        "birthdays": [
            {"name": "No id", "birthDate": "1980-01-01"},
            {"id": 1, "name": "Keeps one", "birthDate": "1981-02-02"}
        ]
    })
    .to_string();

    let report = backup::import_json(&h.repo, &doc, ImportStrategy::Overwrite)
        .await
        .unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(h.repo.get(1).await.unwrap().name, "Keeps one");
    let names: Vec<String> = h.repo.all().await.unwrap().into_iter().map(|b| b.name).collect();
    assert_eq!(names, vec!["Keeps one", "No id"]);
}
