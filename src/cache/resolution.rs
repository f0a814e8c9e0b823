//! Resolution Module
//!
//! The single result type handed to every party waiting on a key, and the
//! three ways a party can wait for it.

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::cache::CacheKey;
use crate::error::CacheError;

// == Origin ==
/// Tier that produced a resolved object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Memory,
    Disk,
    Network,
}

// == Resolution ==
/// Outcome of resolving one `(url, key)` pair.
///
/// A failed resolution carries no object; callers treat it as "not
/// available now" and may simply ask again.
pub struct Resolution<V> {
    pub url: String,
    pub key: CacheKey,
    pub outcome: Result<Arc<V>, Arc<CacheError>>,
    /// Set when an object was produced
    pub origin: Option<Origin>,
}

impl<V> Resolution<V> {
    pub fn resolved(url: String, key: CacheKey, object: Arc<V>, origin: Origin) -> Self {
        Self {
            url,
            key,
            outcome: Ok(object),
            origin: Some(origin),
        }
    }

    pub fn failed(url: String, key: CacheKey, error: Arc<CacheError>) -> Self {
        Self {
            url,
            key,
            outcome: Err(error),
            origin: None,
        }
    }

    pub fn object(&self) -> Option<&Arc<V>> {
        self.outcome.as_ref().ok()
    }

    pub fn into_object(self) -> Option<Arc<V>> {
        self.outcome.ok()
    }

    pub fn error(&self) -> Option<&CacheError> {
        self.outcome.as_ref().err().map(|e| e.as_ref())
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl<V> Clone for Resolution<V> {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            key: self.key.clone(),
            outcome: self.outcome.clone(),
            origin: self.origin,
        }
    }
}

impl<V> fmt::Debug for Resolution<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("url", &self.url)
            .field("key", &self.key)
            .field("resolved", &self.is_resolved())
            .field("origin", &self.origin)
            .field("error", &self.error().map(|e| e.to_string()))
            .finish()
    }
}

// == Resolution Sink ==
/// A party interested in every resolution it registered for.
pub trait ResolutionSink<V>: Send + Sync {
    fn on_resolved(&self, resolution: &Resolution<V>);
}

// == Waiter ==
/// One registered interest in a pending key.
pub enum Waiter<V> {
    /// An awaiting `get`
    Channel(oneshot::Sender<Resolution<V>>),
    /// A one-shot completion callback
    Callback(Box<dyn FnOnce(Resolution<V>) + Send>),
    /// A shared sink
    Sink(Arc<dyn ResolutionSink<V>>),
}

impl<V> Waiter<V> {
    pub fn callback<F>(callback: F) -> Self
    where
        F: FnOnce(Resolution<V>) + Send + 'static,
    {
        Waiter::Callback(Box::new(callback))
    }

    /// Hands the resolution over. Must be called without any store lock held.
    pub fn deliver(self, resolution: &Resolution<V>) {
        match self {
            // Receiver dropped: the caller stopped waiting
            Waiter::Channel(tx) => {
                let _ = tx.send(resolution.clone());
            }
            Waiter::Callback(callback) => callback(resolution.clone()),
            Waiter::Sink(sink) => sink.on_resolved(resolution),
        }
    }
}

impl<V> fmt::Debug for Waiter<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Waiter::Channel(_) => "Channel",
            Waiter::Callback(_) => "Callback",
            Waiter::Sink(_) => "Sink",
        };
        f.write_str(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ResolutionSink<String> for Recorder {
        fn on_resolved(&self, resolution: &Resolution<String>) {
            let value = resolution
                .object()
                .map(|v| v.to_string())
                .unwrap_or_default();
            self.0.lock().push(value);
        }
    }

    fn sample() -> Resolution<String> {
        Resolution::resolved(
            "http://x/a".to_string(),
            CacheKey::new("a"),
            Arc::new("obj".to_string()),
            Origin::Network,
        )
    }

    #[test]
    fn test_failed_resolution_has_no_object() {
        let failed: Resolution<String> = Resolution::failed(
            "http://x/a".to_string(),
            CacheKey::new("a"),
            Arc::new(CacheError::Abandoned("a".to_string())),
        );
        assert!(failed.object().is_none());
        assert!(failed.origin.is_none());
        assert!(matches!(failed.error(), Some(CacheError::Abandoned(_))));
    }

    #[test]
    fn test_deliver_to_each_waiter_kind() {
        let resolution = sample();

        let (tx, mut rx) = oneshot::channel();
        Waiter::Channel(tx).deliver(&resolution);
        assert_eq!(rx.try_recv().unwrap().into_object().as_deref(), Some(&"obj".to_string()));

        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        Waiter::callback(move |r: Resolution<String>| *slot.lock() = r.origin).deliver(&resolution);
        assert_eq!(*seen.lock(), Some(Origin::Network));

        let sink = Arc::new(Recorder::default());
        Waiter::Sink(sink.clone()).deliver(&resolution);
        assert_eq!(*sink.0.lock(), vec!["obj".to_string()]);
    }

    #[test]
    fn test_deliver_to_dropped_channel_is_silent() {
        let (tx, rx) = oneshot::channel::<Resolution<String>>();
        drop(rx);
        Waiter::Channel(tx).deliver(&sample());
    }
}
