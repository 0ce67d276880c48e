//! In-process store: one lock per user queue.

use super::{QueueEntry, StoreError, WaveformStore};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Default)]
struct UserQueue {
    entries: VecDeque<QueueEntry>,
    /// Set once the queue has been removed from the map; writers must look it up again.
    retired: bool,
}

type SharedQueue = Arc<Mutex<UserQueue>>;

/// [`WaveformStore`] backed by memory.
///
/// The outer map lock is only held to find, create or remove a user's queue; all
/// mutation of a queue happens under that queue's own mutex, which is the per-user
/// serialization point. A cleared user is dropped from the map, so idle users cost
/// nothing.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<String, SharedQueue>>,
}

impl InMemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users that currently hold a queue.
    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    fn queue(&self, user_id: &str) -> SharedQueue {
        if let Some(queue) = self.users.read().get(user_id) {
            return queue.clone();
        }
        self.users
            .write()
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    fn existing(&self, user_id: &str) -> Option<SharedQueue> {
        self.users.read().get(user_id).cloned()
    }
}

#[async_trait]
impl WaveformStore for InMemoryStore {
    async fn max_sequence(&self, user_id: &str) -> Result<Option<u64>, StoreError> {
        Ok(self
            .existing(user_id)
            .and_then(|queue| queue.lock().entries.back().map(|e| e.sequence_id)))
    }

    async fn insert_bounded(
        &self,
        entry: QueueEntry,
        capacity: usize,
    ) -> Result<Vec<u64>, StoreError> {
        loop {
            let shared = self.queue(&entry.user_id);
            let mut queue = shared.lock();
            if queue.retired {
                // Cleared between lookup and lock; the next lookup creates a fresh queue.
                continue;
            }

            if let Some(last) = queue.entries.back() {
                if entry.sequence_id <= last.sequence_id {
                    return Err(StoreError::SequenceConflict {
                        user_id: entry.user_id,
                        sequence_id: entry.sequence_id,
                    });
                }
            }

            queue.entries.push_back(entry);
            let mut evicted = Vec::new();
            while queue.entries.len() > capacity {
                if let Some(oldest) = queue.entries.pop_front() {
                    evicted.push(oldest.sequence_id);
                }
            }
            return Ok(evicted);
        }
    }

    async fn latest_and_prune(
        &self,
        user_id: &str,
    ) -> Result<Option<(QueueEntry, usize)>, StoreError> {
        let Some(queue) = self.existing(user_id) else {
            return Ok(None);
        };
        let mut queue = queue.lock();
        let pruned = queue.entries.len().saturating_sub(1);
        queue.entries.drain(..pruned);
        Ok(queue.entries.back().cloned().map(|entry| (entry, pruned)))
    }

    async fn clear(&self, user_id: &str) -> Result<usize, StoreError> {
        let mut users = self.users.write();
        let Some(shared) = users.remove(user_id) else {
            return Ok(0);
        };
        let mut queue = shared.lock();
        queue.retired = true;
        let removed = queue.entries.len();
        queue.entries.clear();
        Ok(removed)
    }

    async fn entries(&self, user_id: &str) -> Result<Vec<QueueEntry>, StoreError> {
        Ok(self
            .existing(user_id)
            .map(|queue| queue.lock().entries.iter().cloned().collect())
            .unwrap_or_default())
    }
}
