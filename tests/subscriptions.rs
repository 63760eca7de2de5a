#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use std::time::Duration;

use birthdays_lib::dao::BirthdayQuery;
use birthdays_lib::NewBirthday;
use futures::StreamExt;
use tokio::time::timeout;
use util::{at, date, harness};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn pushes_initial_result_then_every_change() {
    let h = harness(at(2024, 3, 1, 9, 0)).await;
    let mut sub = h.repo.subscribe(BirthdayQuery::All);

    let first = timeout(WAIT, sub.recv()).await.unwrap().unwrap().unwrap();
    assert!(first.is_empty());

    h.repo.add(NewBirthday::new("Ann", date(1990, 6, 15))).await.unwrap();
    let second = timeout(WAIT, sub.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].name, "Ann");
}

#[tokio::test]
async fn filtered_subscription_sees_matching_records_only() {
    let h = harness(at(2024, 3, 1, 9, 0)).await;
    let mut sub = h.repo.subscribe(BirthdayQuery::Month(6));
    timeout(WAIT, sub.recv()).await.unwrap().unwrap().unwrap();

    h.repo.add(NewBirthday::new("June", date(1990, 6, 15))).await.unwrap();
    let june = timeout(WAIT, sub.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(june.len(), 1);

    h.repo.add(NewBirthday::new("July", date(1990, 7, 15))).await.unwrap();
    let still_june = timeout(WAIT, sub.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(still_june.len(), 1);
    assert_eq!(still_june[0].name, "June");
}

#[tokio::test]
async fn nothing_is_delivered_after_cancel() {
    let h = harness(at(2024, 3, 1, 9, 0)).await;
    let mut sub = h.repo.subscribe(BirthdayQuery::All);
    timeout(WAIT, sub.recv()).await.unwrap().unwrap().unwrap();

    h.repo.add(NewBirthday::new("Ann", date(1990, 6, 15))).await.unwrap();
    sub.cancel();
    assert!(sub.is_cancelled());

    h.repo.add(NewBirthday::new("Bob", date(1991, 2, 3))).await.unwrap();
    assert!(sub.recv().await.is_none());
}

#[tokio::test]
async fn stream_form_yields_snapshots() {
    let h = harness(at(2024, 3, 1, 9, 0)).await;
    h.repo.add(NewBirthday::new("Ann", date(1990, 6, 15))).await.unwrap();
    let mut stream = Box::pin(h.repo.subscribe(BirthdayQuery::All).into_stream());

    let first = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(first.len(), 1);

    h.repo.delete(first[0].id).await.unwrap();
    let second = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    assert!(second.is_empty());
}
