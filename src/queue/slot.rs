//! Single "latest snapshot" slot per user, outside the queue.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Contents of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEntry {
    /// Base64 PNG as uploaded
    pub payload: String,
    /// Time of the last upsert
    pub created_at: DateTime<Utc>,
}

/// Upsert-only store backing the legacy upload and read endpoints.
#[derive(Debug, Default)]
pub struct SnapshotSlots {
    slots: RwLock<HashMap<String, SlotEntry>>,
}

impl SnapshotSlots {
    /// No slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the user's slot and returns the stored entry.
    pub fn put(&self, user_id: &str, payload: String) -> SlotEntry {
        let entry = SlotEntry {
            payload,
            created_at: Utc::now(),
        };
        self.slots
            .write()
            .insert(user_id.to_string(), entry.clone());
        entry
    }

    /// Reads without removing.
    pub fn get(&self, user_id: &str) -> Option<SlotEntry> {
        self.slots.read().get(user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_overwrites() {
        let slots = SnapshotSlots::new();
        assert!(slots.get("u").is_none());
        slots.put("u", "first".into());
        slots.put("u", "second".into());
        assert_eq!(slots.get("u").unwrap().payload, "second");
        // Reads do not consume.
        assert!(slots.get("u").is_some());
    }
}
