//! Bounded pool of reusable execution contexts
//!
//! Entries live in an arena of slots; free entries are tracked by a FIFO
//! queue of slot indices so acquire and release are O(1). When the pool is
//! full and pooling is disabled, callers get a temporary entry that never
//! counts against capacity and is destroyed on release.

use crate::error::PoolError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// What `acquire` does when every tracked entry is busy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Wait for a release, up to the acquire timeout
    #[default]
    Block,
    /// Fail immediately
    Fail,
}

/// Pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of tracked entries
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// When false, a full pool hands out untracked temporary entries
    #[serde(default = "default_pooling_enabled")]
    pub pooling_enabled: bool,
    #[serde(default)]
    pub exhaustion: ExhaustionPolicy,
    /// Longest time `acquire` waits under the block policy
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
    /// Memory budget advertised to each context
    #[serde(default = "default_memory_limit")]
    pub memory_limit_mb: u64,
    /// Per-task timeout carried by each context
    #[serde(default = "default_context_timeout")]
    pub context_timeout_seconds: u64,
}

fn default_capacity() -> usize {
    10
}

fn default_pooling_enabled() -> bool {
    true
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_memory_limit() -> u64 {
    512
}

fn default_context_timeout() -> u64 {
    30
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            pooling_enabled: default_pooling_enabled(),
            exhaustion: ExhaustionPolicy::default(),
            acquire_timeout_seconds: default_acquire_timeout(),
            memory_limit_mb: default_memory_limit(),
            context_timeout_seconds: default_context_timeout(),
        }
    }
}

/// One reusable execution context
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub memory_limit_mb: u64,
    pub timeout: Duration,
    pub busy: bool,
}

/// Point-in-time pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    /// Tracked entries currently alive
    pub created: usize,
    pub busy: usize,
    pub free: usize,
    /// Untracked entries currently handed out
    pub temporary: usize,
}

struct PoolInner {
    slots: Vec<Option<PoolEntry>>,
    /// Indices of slots holding idle entries, oldest release first
    free: VecDeque<usize>,
    /// Indices of destroyed slots available for reuse
    vacant: Vec<usize>,
    created: usize,
    temporary: usize,
    next_id: u64,
}

/// Bounded pool of execution contexts
pub struct ResourcePool {
    config: PoolConfig,
    inner: Mutex<PoolInner>,
    released: Notify,
}

impl ResourcePool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                slots: Vec::with_capacity(config.capacity),
                free: VecDeque::with_capacity(config.capacity),
                vacant: Vec::new(),
                created: 0,
                temporary: 0,
                next_id: 1,
            }),
            config,
            released: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn new_entry(&self, id: u64) -> PoolEntry {
        PoolEntry {
            id,
            created_at: Utc::now(),
            memory_limit_mb: self.config.memory_limit_mb,
            timeout: Duration::from_secs(self.config.context_timeout_seconds),
            busy: true,
        }
    }

    /// Hand out an entry without waiting, if the pool allows it
    pub fn try_acquire(self: &Arc<Self>) -> Option<PoolLease> {
        let mut inner = self.lock();

        if let Some(index) = inner.free.pop_front() {
            if let Some(entry) = inner.slots[index].as_mut() {
                entry.busy = true;
                let entry = entry.clone();
                return Some(PoolLease::tracked(Arc::clone(self), index, entry));
            }
        }

        if inner.created < self.config.capacity {
            let id = inner.next_id;
            inner.next_id += 1;
            let entry = self.new_entry(id);
            let index = match inner.vacant.pop() {
                Some(index) => {
                    inner.slots[index] = Some(entry.clone());
                    index
                }
                None => {
                    inner.slots.push(Some(entry.clone()));
                    inner.slots.len() - 1
                }
            };
            inner.created += 1;
            debug!(entry_id = id, created = inner.created, "Created pool entry");
            return Some(PoolLease::tracked(Arc::clone(self), index, entry));
        }

        if !self.config.pooling_enabled {
            let id = inner.next_id;
            inner.next_id += 1;
            inner.temporary += 1;
            debug!(entry_id = id, "Pool full, created temporary entry");
            return Some(PoolLease::temporary(Arc::clone(self), self.new_entry(id)));
        }

        None
    }

    /// Acquire an entry, applying the exhaustion policy when the pool is full
    pub async fn acquire(self: &Arc<Self>) -> Result<PoolLease, PoolError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.acquire_timeout_seconds);

        loop {
            let notified = self.released.notified();

            if let Some(lease) = self.try_acquire() {
                return Ok(lease);
            }

            let exhausted = PoolError::Exhausted {
                capacity: self.config.capacity,
            };
            match self.config.exhaustion {
                ExhaustionPolicy::Fail => return Err(exhausted),
                ExhaustionPolicy::Block => {
                    if timeout_at(deadline, notified).await.is_err() {
                        warn!(
                            capacity = self.config.capacity,
                            "Timed out waiting for a pool entry"
                        );
                        return Err(exhausted);
                    }
                }
            }
        }
    }

    /// Return an entry to the pool
    pub fn release(&self, lease: PoolLease) {
        drop(lease);
    }

    fn release_slot(&self, slot: Option<usize>, id: u64) {
        let mut inner = self.lock();
        match slot {
            Some(index) => {
                if let Some(entry) = inner.slots[index].as_mut() {
                    entry.busy = false;
                    inner.free.push_back(index);
                }
                drop(inner);
                self.released.notify_one();
            }
            None => {
                inner.temporary = inner.temporary.saturating_sub(1);
                debug!(entry_id = id, "Destroyed temporary entry");
            }
        }
    }

    /// Destroy every idle entry
    pub fn cleanup(&self) -> usize {
        let mut inner = self.lock();
        let idle: Vec<usize> = inner.free.drain(..).collect();
        for index in &idle {
            inner.slots[*index] = None;
            inner.vacant.push(*index);
        }
        inner.created -= idle.len();
        debug!(destroyed = idle.len(), "Pool cleanup");
        idle.len()
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.lock();
        PoolStats {
            capacity: self.config.capacity,
            created: inner.created,
            busy: inner.created - inner.free.len(),
            free: inner.free.len(),
            temporary: inner.temporary,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

/// Entry on loan from the pool; returned when dropped
pub struct PoolLease {
    pool: Arc<ResourcePool>,
    slot: Option<usize>,
    entry: PoolEntry,
}

impl PoolLease {
    fn tracked(pool: Arc<ResourcePool>, slot: usize, entry: PoolEntry) -> Self {
        Self {
            pool,
            slot: Some(slot),
            entry,
        }
    }

    fn temporary(pool: Arc<ResourcePool>, entry: PoolEntry) -> Self {
        Self {
            pool,
            slot: None,
            entry,
        }
    }

    pub fn entry(&self) -> &PoolEntry {
        &self.entry
    }

    /// True when the entry is not tracked by the pool
    pub fn is_temporary(&self) -> bool {
        self.slot.is_none()
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.pool.release_slot(self.slot, self.entry.id);
    }
}
