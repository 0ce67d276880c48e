//! Server-side bounded per-user queue of snapshots.
//!
//! Every user owns a FIFO of at most `capacity` live entries ordered by a per-user
//! `sequence_id`. Ingestion assigns `max + 1` (1 for an empty queue) and evicts the
//! oldest entries once the live count exceeds the capacity, so the queue behaves as a
//! ring buffer of exactly `capacity` entries.
//!
//! Sequence assignment is optimistic: the queue reads the current maximum and asks the
//! store to insert with a uniqueness check on `(user_id, sequence_id)`. A concurrent
//! ingest that won the race makes the insert fail with
//! [`StoreError::SequenceConflict`] and the whole step is retried, up to a bounded
//! number of attempts.

pub mod memory;
pub mod slot;

use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub use memory::InMemoryStore;
pub use slot::{SlotEntry, SnapshotSlots};

/// One stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Owner of the entry
    pub user_id: String,
    /// Per-user, strictly increasing; the largest id is the latest entry
    pub sequence_id: u64,
    /// Base64 PNG, data-URL prefix already removed
    pub payload: String,
    /// Server receive time
    pub created_at: DateTime<Utc>,
}

/// Failures a store may report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Another writer already holds this or a later sequence id.
    #[error("sequence id {sequence_id} already taken for user {user_id}")]
    SequenceConflict {
        /// User whose queue was written concurrently
        user_id: String,
        /// Id the losing writer tried to insert
        sequence_id: u64,
    },

    /// Storage engine failure unrelated to concurrency.
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Transactional contract the queue needs from its storage engine.
#[async_trait]
pub trait WaveformStore: Send + Sync {
    /// Highest live sequence id for the user.
    async fn max_sequence(&self, user_id: &str) -> Result<Option<u64>, StoreError>;

    /// Atomically inserts `entry` unless its id is not above the user's current maximum,
    /// then evicts the oldest entries until at most `capacity` remain. Returns the
    /// evicted ids.
    async fn insert_bounded(
        &self,
        entry: QueueEntry,
        capacity: usize,
    ) -> Result<Vec<u64>, StoreError>;

    /// Returns the newest entry and deletes every older one, atomically. The count is
    /// the number of entries deleted.
    async fn latest_and_prune(&self, user_id: &str)
        -> Result<Option<(QueueEntry, usize)>, StoreError>;

    /// Deletes all of the user's entries and returns how many there were.
    async fn clear(&self, user_id: &str) -> Result<usize, StoreError>;

    /// Live entries, oldest first.
    async fn entries(&self, user_id: &str) -> Result<Vec<QueueEntry>, StoreError>;
}

/// The queue operations exposed to the HTTP layer.
#[derive(Clone)]
pub struct BoundedQueue {
    store: Arc<dyn WaveformStore>,
    capacity: usize,
    max_retries: u32,
}

impl BoundedQueue {
    /// Queue keeping at most `capacity` entries per user, retrying id conflicts up to
    /// `max_retries` times. Both are clamped to at least 1.
    pub fn new(store: Arc<dyn WaveformStore>, capacity: usize, max_retries: u32) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            max_retries: max_retries.max(1),
        }
    }

    /// Entries kept per user.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a snapshot, evicting the oldest entry when the queue is full.
    pub async fn ingest(&self, user_id: &str, payload: String) -> RelayResult<QueueEntry> {
        for attempt in 1..=self.max_retries {
            let sequence_id = self
                .store
                .max_sequence(user_id)
                .await
                .map_err(store_error)?
                .map_or(1, |max| max + 1);

            let entry = QueueEntry {
                user_id: user_id.to_string(),
                sequence_id,
                payload: payload.clone(),
                created_at: Utc::now(),
            };

            match self.store.insert_bounded(entry.clone(), self.capacity).await {
                Ok(evicted) => {
                    debug!(user_id, sequence_id, ?evicted, "snapshot queued");
                    return Ok(entry);
                }
                Err(StoreError::SequenceConflict { .. }) => {
                    warn!(user_id, sequence_id, attempt, "sequence id conflict; retrying");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(store_error(e)),
            }
        }

        Err(RelayError::QueueCapacityRace {
            user_id: user_id.to_string(),
            attempts: self.max_retries,
        })
    }

    /// Destructive read: the newest entry, with every older one deleted.
    pub async fn read_latest_and_prune(&self, user_id: &str) -> RelayResult<Option<QueueEntry>> {
        let latest = self
            .store
            .latest_and_prune(user_id)
            .await
            .map_err(store_error)?;
        Ok(latest.map(|(entry, pruned)| {
            debug!(user_id, sequence_id = entry.sequence_id, pruned, "latest snapshot read");
            entry
        }))
    }

    /// Removes every entry of the user and returns the count.
    pub async fn bulk_clear(&self, user_id: &str) -> RelayResult<usize> {
        self.store.clear(user_id).await.map_err(store_error)
    }

    /// Live entries, oldest first.
    pub async fn entries(&self, user_id: &str) -> RelayResult<Vec<QueueEntry>> {
        self.store.entries(user_id).await.map_err(store_error)
    }
}

fn store_error(e: StoreError) -> RelayError {
    RelayError::Store(e.to_string())
}
