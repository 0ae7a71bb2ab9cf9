use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::clock::{Clock, TimestampMs};
use crate::domain::models::CommandKind;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedCommand {
    pub command_id: Option<String>,
    pub command: CommandKind,
    pub station_name: String,
    pub stored_at: TimestampMs,
}

/// Process-local fallback store keyed by charger id.
pub trait CommandCache: Send + Sync {
    fn put(&self, key: &str, command: CachedCommand);
    fn get(&self, key: &str) -> Option<CachedCommand>;
    /// Drops the entry only while it still refers to `command_id`.
    fn remove_if(&self, key: &str, command_id: &str) -> bool;
}

pub struct InMemoryCommandCache {
    ttl_ms: i64,
    capacity: usize,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CachedCommand>>,
}

impl InMemoryCommandCache {
    pub fn new(ttl_ms: i64, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl_ms,
            capacity: capacity.max(1),
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn is_expired(&self, entry: &CachedCommand, now: TimestampMs) -> bool {
        entry.stored_at.plus_millis(self.ttl_ms) <= now
    }
}

impl CommandCache for InMemoryCommandCache {
    fn put(&self, key: &str, command: CachedCommand) {
        let now = self.clock.now();
        let Ok(mut entries) = self.entries.lock() else {
            tracing::warn!(key, "command cache lock poisoned; dropping entry");
            return;
        };

        entries.retain(|_, entry| !self.is_expired(entry, now));

        if !entries.contains_key(key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(oldest_key, _)| oldest_key.clone());
            if let Some(oldest_key) = oldest {
                entries.remove(&oldest_key);
                tracing::debug!(evicted = %oldest_key, "command cache full; evicted oldest entry");
            }
        }

        entries.insert(key.to_string(), command);
    }

    fn get(&self, key: &str) -> Option<CachedCommand> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().ok()?;

        let expired = self.is_expired(entries.get(key)?, now);
        if expired {
            entries.remove(key);
            return None;
        }

        entries.get(key).cloned()
    }

    fn remove_if(&self, key: &str, command_id: &str) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };

        let matches = entries
            .get(key)
            .is_some_and(|entry| entry.command_id.as_deref() == Some(command_id));
        if matches {
            entries.remove(key);
        }
        matches
    }
}
