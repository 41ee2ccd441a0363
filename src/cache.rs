//! Query-text keyed store of compiled statements shared by every handle.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Storage policy for pool-bound statements.
///
/// `get` followed by a prepare-on-miss and `put` is not atomic: two callers
/// missing on the same text may both prepare, and the last `put` wins. Since
/// statements for the same text are interchangeable that only costs a redundant
/// prepare. Implementations wanting eviction or single-flight preparation plug
/// in here.
pub trait StatementStore<S>: Send + Sync {
    fn get(&self, query: &str) -> Option<Arc<S>>;

    fn put(&self, query: &str, stmt: Arc<S>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded, never-evicting cache behind a reader/writer lock.
#[derive(Debug)]
pub struct StatementCache<S> {
    stmts: RwLock<HashMap<String, Arc<S>>>,
}

impl<S> StatementCache<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stmts: RwLock::new(HashMap::new()),
        }
    }
}

impl<S> Default for StatementCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + Sync> StatementStore<S> for StatementCache<S> {
    fn get(&self, query: &str) -> Option<Arc<S>> {
        // A writer panicking mid-insert cannot leave the map half-updated.
        let stmts = self.stmts.read().unwrap_or_else(PoisonError::into_inner);
        stmts.get(query).cloned()
    }

    fn put(&self, query: &str, stmt: Arc<S>) {
        let mut stmts = self.stmts.write().unwrap_or_else(PoisonError::into_inner);
        stmts.insert(query.to_owned(), stmt);
    }

    fn len(&self) -> usize {
        self.stmts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn miss_then_hit() {
        let cache = StatementCache::<String>::new();
        assert!(cache.get("SELECT 1").is_none());
        cache.put("SELECT 1", Arc::new("stmt-a".to_owned()));
        assert_eq!(cache.get("SELECT 1").as_deref().map(String::as_str), Some("stmt-a"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn put_overwrites_same_text() {
        let cache = StatementCache::<u32>::new();
        cache.put("q", Arc::new(1));
        cache.put("q", Arc::new(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("q").map(|s| *s), Some(2));
    }

    #[test]
    fn concurrent_readers_and_writers_converge() {
        let cache = Arc::new(StatementCache::<usize>::new());
        let workers = (0..8)
            .map(|n| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("q{}", i % 10);
                        if cache.get(&key).is_none() {
                            cache.put(&key, Arc::new(n));
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(cache.len(), 10);
    }
}
