//! Per-organization result cache with expiry and bounded size.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use uuid::Uuid;

struct Entry<T> {
    value: Arc<T>,
    stored_at: Instant,
}

/// Latest result per organization. Entries older than the TTL read as absent;
/// when full, inserting a new organization evicts the oldest entry.
pub struct ResultCache<T> {
    entries: RwLock<HashMap<Uuid, Entry<T>>>,
    ttl: Duration,
    capacity: usize,
}

impl<T> ResultCache<T> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn insert(&self, organization_id: Uuid, value: T) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        entries.retain(|_, e| now.duration_since(e.stored_at) < self.ttl);

        if !entries.contains_key(&organization_id) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(id, _)| *id);
            if let Some(id) = oldest {
                entries.remove(&id);
            }
        }

        entries.insert(
            organization_id,
            Entry {
                value: Arc::new(value),
                stored_at: now,
            },
        );
    }

    /// `None` when nothing was stored yet or the entry has expired.
    pub fn get(&self, organization_id: Uuid) -> Option<Arc<T>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&organization_id)
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .map(|e| Arc::clone(&e.value))
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .values()
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
