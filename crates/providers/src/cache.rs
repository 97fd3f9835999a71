//! Bounded cache of live chat clients, keyed by model id.
//!
//! Clients hold connection pools, so the cache shuts a client down whenever
//! it leaves the cache: LRU eviction, replacement under the same key,
//! explicit removal, or `clear()`.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use stepwire_core::error::ProviderError;
use stepwire_core::provider::ChatClient;
use tracing::debug;

pub const DEFAULT_CACHE_CAPACITY: usize = 5;

pub struct ClientCache {
    inner: Mutex<LruCache<String, Arc<dyn ChatClient>>>,
}

impl ClientCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return the cached client for `key`, creating and caching one with
    /// `create` on a miss.
    pub fn get_or_create<F>(&self, key: &str, create: F) -> Result<Arc<dyn ChatClient>, ProviderError>
    where
        F: FnOnce() -> Result<Arc<dyn ChatClient>, ProviderError>,
    {
        let mut cache = self.inner.lock();
        if let Some(client) = cache.get(key) {
            return Ok(Arc::clone(client));
        }

        let client = create()?;
        debug!(model = %key, "Caching new chat client");
        if let Some((old_key, old)) = cache.push(key.to_string(), Arc::clone(&client)) {
            retire(&old_key, &old, &client);
        }
        Ok(client)
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn ChatClient>> {
        self.inner.lock().get(key).cloned()
    }

    /// Insert or replace the client for `key`.
    pub fn put(&self, key: impl Into<String>, client: Arc<dyn ChatClient>) {
        let key = key.into();
        let mut cache = self.inner.lock();
        if let Some((old_key, old)) = cache.push(key, Arc::clone(&client)) {
            retire(&old_key, &old, &client);
        }
    }

    /// Remove and shut down the client for `key`. Returns whether one existed.
    pub fn remove(&self, key: &str) -> bool {
        match self.inner.lock().pop(key) {
            Some(client) => {
                client.shutdown();
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut cache = self.inner.lock();
        while let Some((key, client)) = cache.pop_lru() {
            debug!(model = %key, "Shutting down cached chat client");
            client.shutdown();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }
}

impl Default for ClientCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// Shut down a client that left the cache, unless it is the one just inserted.
fn retire(key: &str, old: &Arc<dyn ChatClient>, inserted: &Arc<dyn ChatClient>) {
    if Arc::ptr_eq(old, inserted) {
        return;
    }
    debug!(model = %key, "Chat client left the cache");
    old.shutdown();
}
