//! The database handle plus a change feed that drives push-based subscriptions.

use futures::Stream;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::dao::{self, BirthdayQuery};
use crate::model::Birthday;

/// Default buffer capacity for the change feed.
const CHANGE_CAPACITY: usize = 256;

/// Pending results held for a slow subscriber before the producer waits.
const SUBSCRIPTION_BUFFER: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Inserted(i64),
    Updated(i64),
    Deleted(i64),
    /// Many rows at once, e.g. a backup import.
    Bulk,
}

/// Shared handle over the pool. Cloning is cheap and clones share the change feed.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    changes: broadcast::Sender<StoreChange>,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self { pool, changes }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Announce a committed write. No receivers is fine.
    pub fn publish(&self, change: StoreChange) {
        let _ = self.changes.send(change);
    }

    pub fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    pub async fn insert(&self, record: &Birthday) -> Result<i64, sqlx::Error> {
        let id = dao::insert(&self.pool, record).await?;
        self.publish(StoreChange::Inserted(id));
        Ok(id)
    }

    pub async fn update(&self, record: &Birthday) -> Result<u64, sqlx::Error> {
        let touched = dao::update(&self.pool, record).await?;
        if touched > 0 {
            self.publish(StoreChange::Updated(record.id));
        }
        Ok(touched)
    }

    pub async fn set_pinned(&self, id: i64, pinned: bool) -> Result<u64, sqlx::Error> {
        let touched = dao::set_pinned(&self.pool, id, pinned).await?;
        if touched > 0 {
            self.publish(StoreChange::Updated(id));
        }
        Ok(touched)
    }

    pub async fn delete(&self, id: i64) -> Result<u64, sqlx::Error> {
        let touched = dao::delete(&self.pool, id).await?;
        if touched > 0 {
            self.publish(StoreChange::Deleted(id));
        }
        Ok(touched)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Birthday>, sqlx::Error> {
        dao::get(&self.pool, id).await
    }

    pub async fn list(&self, query: &BirthdayQuery) -> Result<Vec<Birthday>, sqlx::Error> {
        dao::list(&self.pool, query).await
    }

    /// Push the result of `query` now and again after every change, until cancelled.
    pub fn subscribe(&self, query: BirthdayQuery) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        // Subscribe before the first query so no change slips between the two.
        let mut changes = self.changes.subscribe();
        let pool = self.pool.clone();
        let task = tokio::spawn(async move {
            loop {
                let result = dao::list(&pool, &query).await;
                if let Err(err) = &result {
                    tracing::warn!(target: "birthdays", event = "subscription_query_failed", error = %err);
                }
                if tx.send(result).await.is_err() {
                    break;
                }
                match changes.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Collapse a burst of changes into one re-query.
                        while changes.try_recv().is_ok() {}
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription {
            rx,
            task,
            cancelled: false,
        }
    }
}

/// Live query results. Dropping or cancelling stops delivery immediately.
pub struct Subscription {
    rx: mpsc::Receiver<Result<Vec<Birthday>, sqlx::Error>>,
    task: JoinHandle<()>,
    cancelled: bool,
}

impl Subscription {
    /// Next snapshot, or `None` once cancelled or the store is gone.
    pub async fn recv(&mut self) -> Option<Result<Vec<Birthday>, sqlx::Error>> {
        if self.cancelled {
            return None;
        }
        self.rx.recv().await
    }

    /// Stop the producer and discard anything already buffered.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.task.abort();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// The snapshots as a stream; dropping the stream cancels the subscription.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<Birthday>, sqlx::Error>> {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|item| (item, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
