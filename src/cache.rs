//! Process-lifetime single-flight cache.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Builds each value at most once per key, sharing in-flight builds.
///
/// Callers that arrive while a build for their key is running wait for it
/// instead of starting their own. A failed build leaves the key empty so the
/// next caller tries again. Values are never evicted.
pub struct SingleFlight<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the value for `key`, running `factory` if none is cached.
    pub async fn get_or_init<F, Fut, E>(&self, key: &K, factory: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            cells.entry(key.clone()).or_default().clone()
        };

        cell.get_or_try_init(factory).await.cloned()
    }

    /// Returns the cached value for `key` without building it.
    pub fn get(&self, key: &K) -> Option<V> {
        let cells = self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cells.get(key).and_then(|cell| cell.get().cloned())
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_build() {
        let cache = Arc::new(SingleFlight::<String, Arc<String>>::new());
        let builds = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let builds = builds.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_init(&"doc".to_string(), || async move {
                            builds.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, String>(Arc::new("document".to_string()))
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().as_str(), "document");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(cache.get(&"doc".to_string()).is_some());
    }

    #[tokio::test]
    async fn test_failed_build_is_retried() {
        let cache = SingleFlight::<&'static str, u32>::new();

        let failed = cache.get_or_init(&"k", || async { Err::<u32, _>("unreachable") }).await;
        assert_eq!(failed, Err("unreachable"));
        assert_eq!(cache.get(&"k"), None);

        let value = cache.get_or_init(&"k", || async { Ok::<_, &str>(7) }).await;
        assert_eq!(value, Ok(7));

        let cached = cache.get_or_init(&"k", || async { Ok::<_, &str>(8) }).await;
        assert_eq!(cached, Ok(7));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache = SingleFlight::<u8, u8>::new();

        assert_eq!(cache.get_or_init(&1, || async { Ok::<_, ()>(10) }).await, Ok(10));
        assert_eq!(cache.get_or_init(&2, || async { Ok::<_, ()>(20) }).await, Ok(20));
    }
}
