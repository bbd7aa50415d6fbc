use crate::entry::CacheEntry;

use core::fmt;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<K: Hash + ?Sized, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

pub(crate) type Shard<K, V, H> = RwLock<HashMap<K, Arc<CacheEntry<V>>, H>>;

/// The outcome of a counted lookup against the store.
pub(crate) enum Lookup<V> {
  Hit(Arc<V>),
  Miss,
  /// The entry existed but had outlived its TTL and was removed.
  Expired,
}

/// A cache store that is partitioned into multiple, independently locked shards.
///
/// This design allows for high concurrency by ensuring that operations on
/// different keys are unlikely to contend for the same lock.
pub(crate) struct ShardedStore<K, V, H> {
  shards: Box<[CachePadded<Shard<K, V, H>>]>,
  pub(crate) hasher: H,
}

impl<K, V, H> fmt::Debug for ShardedStore<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedStore")
      .field("num_shards", &self.shards.len())
      .finish()
  }
}

impl<K, V, H> ShardedStore<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher + Clone,
{
  /// Creates a new `ShardedStore` with the specified number of shards and hasher.
  ///
  /// `num_shards` must be a non-zero power of two; the builder guarantees it.
  pub(crate) fn new(num_shards: usize, hasher: H) -> Self {
    let mut shards = Vec::with_capacity(num_shards);
    for _ in 0..num_shards {
      let shard_map = HashMap::with_hasher(hasher.clone());
      shards.push(CachePadded::new(RwLock::new(shard_map)));
    }

    Self {
      shards: shards.into_boxed_slice(),
      hasher,
    }
  }

  /// Returns the lock guarding the shard for a given key.
  #[inline]
  pub(crate) fn get_shard<Q>(&self, key: &Q) -> &Shard<K, V, H>
  where
    Q: Hash + ?Sized,
  {
    let hash = hash_key(&self.hasher, key);
    let index = hash as usize & (self.shards.len() - 1);
    &self.shards[index]
  }

  /// Returns an iterator over all the shard locks.
  /// This is useful for "stop-the-world" operations like `clear()`.
  pub(crate) fn iter_shards(&self) -> impl Iterator<Item = &Shard<K, V, H>> {
    self.shards.iter().map(|padded_lock| &**padded_lock)
  }

  /// Looks a key up, evicting it if it has expired.
  ///
  /// The read lock is released before the write lock is taken, so the entry
  /// is only removed if it is still the same expired entry.
  pub(crate) fn lookup<Q>(&self, key: &Q) -> Lookup<V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let shard = self.get_shard(key);
    let expired = {
      let guard = shard.read();
      match guard.get(key) {
        None => return Lookup::Miss,
        Some(entry) if !entry.is_expired() => return Lookup::Hit(entry.value()),
        Some(entry) => Arc::clone(entry),
      }
    };

    let mut guard = shard.write();
    if let Some(current) = guard.get(key) {
      if Arc::ptr_eq(current, &expired) {
        guard.remove(key);
        return Lookup::Expired;
      }
      // Replaced between the two locks.
      if !current.is_expired() {
        return Lookup::Hit(current.value());
      }
    }
    Lookup::Miss
  }

  /// Returns the live value without touching counters or evicting.
  pub(crate) fn peek<Q>(&self, key: &Q) -> Option<Arc<V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let guard = self.get_shard(key).read();
    guard
      .get(key)
      .filter(|entry| !entry.is_expired())
      .map(|entry| entry.value())
  }

  /// Inserts an entry, returning `true` if it replaced an existing one.
  pub(crate) fn insert(&self, key: K, entry: CacheEntry<V>) -> bool {
    self.get_shard(&key).write().insert(key, Arc::new(entry)).is_some()
  }

  pub(crate) fn remove<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.get_shard(key).write().remove(key).is_some()
  }

  /// Removes every entry, returning how many were dropped.
  pub(crate) fn clear(&self) -> usize {
    self
      .iter_shards()
      .map(|shard| {
        let mut guard = shard.write();
        let removed = guard.len();
        guard.clear();
        removed
      })
      .sum()
  }

  /// Removes every expired entry, returning how many were purged.
  pub(crate) fn purge_expired(&self) -> usize {
    self
      .iter_shards()
      .map(|shard| {
        let mut guard = shard.write();
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_expired());
        before - guard.len()
      })
      .sum()
  }

  /// Number of stored entries, expired or not.
  pub(crate) fn len(&self) -> usize {
    self.iter_shards().map(|shard| shard.read().len()).sum()
  }
}
