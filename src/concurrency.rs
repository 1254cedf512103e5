//! Sharded locking discipline for agents and events.
//!
//! Mirrors the original source's fixed-size mutex arrays
//! (`m_eventMutexes`, `m_personMutexes`, both sized 256 — see
//! `Population::lockEvent`/`lockPerson` in
//! `examples/original_source/src/lib/core/population.cpp`), but stores
//! the guarded data directly inside each shard instead of pairing a
//! separate mutex array with unguarded data: acquiring a shard's lock
//! *is* acquiring access to the agents/events that hash into it, which
//! is the safe idiomatic substitute for the original's "lock, then
//! trust the caller to only touch what it locked" convention.
//!
//! In sequential mode the kernel never contends on these locks (each
//! shard is touched by exactly one thread of execution — the
//! dispatcher), so the locking has no observable cost beyond the
//! mutex's uncontended fast path.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

/// Default shard count, matching the original source's mutex array size.
pub const DEFAULT_SHARD_COUNT: usize = 256;

/// A key that can be hashed into a shard index by its integer value.
pub trait ShardKey: Copy + Eq + Hash {
    fn shard_index(&self, shard_count: usize) -> usize;
}

/// Fixed-size sharded map: `shard_count` independent `Mutex<HashMap>`
/// buckets, the owning store for every agent or event the kernel
/// tracks. Locking bucket `k % shard_count` is the kernel's substitute
/// for `lock_event(e)` / `lock_agent(a)` (§4.4, §6): the returned guard
/// stands in for the "locked" state and releases it on drop, playing
/// the role the original's explicit `unlock_*` calls played.
pub struct ShardedStore<K, V> {
    shards: Vec<Mutex<HashMap<K, V>>>,
}

impl<K: ShardKey, V> ShardedStore<K, V> {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let mut shards = Vec::with_capacity(shard_count);
        shards.resize_with(shard_count, || Mutex::new(HashMap::new()));
        Self { shards }
    }

    fn shard_of(&self, key: K) -> &Mutex<HashMap<K, V>> {
        &self.shards[key.shard_index(self.shards.len())]
    }

    /// Lock the shard containing `key` for the duration of the guard.
    /// This is the kernel's `lock_event`/`lock_agent` operation;
    /// dropping the guard is `unlock_event`/`unlock_agent`.
    pub fn lock_shard(&self, key: K) -> MutexGuard<'_, HashMap<K, V>> {
        self.shard_of(key)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.lock_shard(key).insert(key, value)
    }

    pub fn remove(&self, key: K) -> Option<V> {
        self.lock_shard(key).remove(&key)
    }

    pub fn contains(&self, key: K) -> bool {
        self.lock_shard(key).contains_key(&key)
    }

    /// Apply `f` to the value for `key`, while the shard is locked.
    /// Returns `None` if `key` is absent.
    pub fn with<R>(&self, key: K, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.lock_shard(key).get(&key).map(f)
    }

    /// Mutable counterpart of [`Self::with`].
    pub fn with_mut<R>(&self, key: K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.lock_shard(key).get_mut(&key).map(f)
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(|p| p.into_inner()).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
