use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::analytics::types::SkillProfile;

/// Cached per-user state. Every read-modify-write for one user happens while holding
/// that user's slot lock.
#[derive(Debug, Default)]
pub struct UserSlot {
    pub skills: HashMap<String, SkillProfile>,
}

impl UserSlot {
    pub fn clear(&mut self) {
        self.skills.clear();
    }
}

pub type SlotHandle = Arc<AsyncMutex<UserSlot>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub users: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded map of user id to slot. Only slots nobody holds a handle to are evicted, so a
/// user can never have two live slots. When every slot is busy the map grows past
/// `capacity` and shrinks back on later inserts.
pub struct UserSlots {
    slots: Mutex<LruCache<String, SlotHandle>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl UserSlots {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(LruCache::unbounded()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn slot(&self, user_id: &str) -> SlotHandle {
        let mut slots = self.slots.lock();
        if let Some(handle) = slots.get(user_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(handle);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let handle: SlotHandle = Arc::new(AsyncMutex::new(UserSlot::default()));
        slots.put(user_id.to_string(), Arc::clone(&handle));
        self.evict_idle(&mut slots);
        handle
    }

    /// Drops the slot if no caller is using it. Returns whether it was removed.
    pub fn remove_if_idle(&self, user_id: &str) -> bool {
        let mut slots = self.slots.lock();
        let idle = slots
            .peek(user_id)
            .map(|handle| Arc::strong_count(handle) == 1)
            .unwrap_or(false);
        if idle {
            slots.pop(user_id);
        }
        idle
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.slots.lock().contains(user_id)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            users: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn evict_idle(&self, slots: &mut LruCache<String, SlotHandle>) {
        while slots.len() > self.capacity {
            // iter() runs most- to least-recently used.
            let victim = slots
                .iter()
                .rev()
                .find(|(_, handle)| Arc::strong_count(handle) == 1)
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    slots.pop(&key);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(user_id = %key, "evicted idle user slot");
                }
                None => {
                    tracing::warn!(
                        users = slots.len(),
                        capacity = self.capacity,
                        "user slot cache over capacity, all slots busy"
                    );
                    break;
                }
            }
        }
    }
}
