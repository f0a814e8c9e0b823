//! Pending Fetch Module
//!
//! Registry of keys currently being resolved. At most one pending record
//! exists per key; later requests join its waiter list instead of starting
//! another fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::{CacheKey, Resolution, Waiter};
use crate::error::CacheError;

// == Pending Fetch ==
/// In-flight record for one key.
#[derive(Debug)]
pub struct PendingFetch<V> {
    pub url: String,
    /// Waiters in registration order
    pub waiters: Vec<Waiter<V>>,
    pub started_at: Instant,
}

// == Join ==
/// Role of a caller after registering on a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    /// Created the record; must drive the fetch and complete it
    Leader,
    /// Appended to an existing record
    Follower,
}

// == Pending Registry ==
#[derive(Debug)]
pub struct PendingRegistry<V> {
    inflight: Mutex<HashMap<CacheKey, PendingFetch<V>>>,
}

impl<V> Default for PendingRegistry<V> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> PendingRegistry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `waiter` on `key`, creating the record if none exists.
    pub fn join(&self, key: &CacheKey, url: &str, waiter: Waiter<V>) -> Join {
        let mut inflight = self.inflight.lock();
        if let Some(pending) = inflight.get_mut(key) {
            pending.waiters.push(waiter);
            debug!(key = %key, waiters = pending.waiters.len(), "Joined pending fetch");
            return Join::Follower;
        }
        inflight.insert(
            key.clone(),
            PendingFetch {
                url: url.to_string(),
                waiters: vec![waiter],
                started_at: Instant::now(),
            },
        );
        Join::Leader
    }

    /// Removes and returns the record for `key`.
    pub fn take(&self, key: &CacheKey) -> Option<PendingFetch<V>> {
        self.inflight.lock().remove(key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inflight.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inflight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.lock().is_empty()
    }
}

// == Pending Guard ==
/// Held by the leader of a key.
///
/// [`complete`](Self::complete) fans the resolution out to every waiter.
/// Dropping the guard without completing (panic, cancelled task) fans out
/// [`CacheError::Abandoned`] so no waiter is left hanging.
pub struct PendingGuard<V> {
    registry: Arc<PendingRegistry<V>>,
    key: CacheKey,
    url: String,
    done: bool,
}

impl<V> PendingGuard<V> {
    pub fn new(registry: Arc<PendingRegistry<V>>, key: CacheKey, url: String) -> Self {
        Self {
            registry,
            key,
            url,
            done: false,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Ends the pending record and notifies its waiters in order.
    ///
    /// The record is removed before any waiter runs, so a waiter calling
    /// back into the cache starts from a clean state.
    pub fn complete(mut self, resolution: Resolution<V>) {
        self.done = true;
        fan_out(&self.registry, &self.key, &resolution);
    }
}

impl<V> Drop for PendingGuard<V> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        warn!(key = %self.key, url = %self.url, "Pending fetch abandoned");
        let resolution = Resolution::failed(
            self.url.clone(),
            self.key.clone(),
            Arc::new(CacheError::Abandoned(self.key.to_string())),
        );
        fan_out(&self.registry, &self.key, &resolution);
    }
}

fn fan_out<V>(registry: &PendingRegistry<V>, key: &CacheKey, resolution: &Resolution<V>) {
    let Some(pending) = registry.take(key) else {
        return;
    };
    debug!(
        key = %key,
        url = %pending.url,
        waiters = pending.waiters.len(),
        elapsed_ms = pending.started_at.elapsed().as_millis() as u64,
        resolved = resolution.is_resolved(),
        "Completing pending fetch"
    );
    for waiter in pending.waiters {
        waiter.deliver(resolution);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Origin;

    fn collecting(log: &Arc<Mutex<Vec<(usize, bool)>>>, id: usize) -> Waiter<u32> {
        let log = Arc::clone(log);
        Waiter::callback(move |r: Resolution<u32>| log.lock().push((id, r.is_resolved())))
    }

    #[test]
    fn test_first_join_leads_rest_follow() {
        let registry: PendingRegistry<u32> = PendingRegistry::new();
        let key = CacheKey::new("k");
        let log = Arc::new(Mutex::new(Vec::new()));

        assert_eq!(registry.join(&key, "u", collecting(&log, 0)), Join::Leader);
        assert_eq!(registry.join(&key, "u", collecting(&log, 1)), Join::Follower);
        assert_eq!(registry.join(&key, "u", collecting(&log, 2)), Join::Follower);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.take(&key).unwrap().waiters.len(), 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_complete_notifies_in_registration_order() {
        let registry = Arc::new(PendingRegistry::new());
        let key = CacheKey::new("k");
        let log = Arc::new(Mutex::new(Vec::new()));
        for id in 0..4 {
            registry.join(&key, "u", collecting(&log, id));
        }

        let guard = PendingGuard::new(Arc::clone(&registry), key.clone(), "u".to_string());
        guard.complete(Resolution::resolved(
            "u".to_string(),
            key.clone(),
            Arc::new(7),
            Origin::Network,
        ));

        assert_eq!(*log.lock(), vec![(0, true), (1, true), (2, true), (3, true)]);
        assert!(!registry.contains(&key));
    }

    #[test]
    fn test_dropped_guard_abandons_waiters() {
        let registry = Arc::new(PendingRegistry::new());
        let key = CacheKey::new("k");
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.join(&key, "u", collecting(&log, 0));
        registry.join(&key, "u", collecting(&log, 1));

        drop(PendingGuard::new(Arc::clone(&registry), key.clone(), "u".to_string()));

        assert_eq!(*log.lock(), vec![(0, false), (1, false)]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_waiter_may_rejoin_from_callback() {
        let registry = Arc::new(PendingRegistry::new());
        let key = CacheKey::new("k");
        let inner = Arc::clone(&registry);
        let rejoin_key = key.clone();
        registry.join(
            &key,
            "u",
            Waiter::callback(move |_r: Resolution<u32>| {
                // Registry lock is not held while waiters run
                let role = inner.join(&rejoin_key, "u", Waiter::callback(|_| {}));
                assert_eq!(role, Join::Leader);
            }),
        );

        PendingGuard::new(Arc::clone(&registry), key.clone(), "u".to_string()).complete(
            Resolution::resolved("u".to_string(), key.clone(), Arc::new(1), Origin::Disk),
        );
        assert!(registry.contains(&key));
    }
}
