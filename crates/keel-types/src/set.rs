//! Ordered set with an internal reader/writer lock.

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::sync::RwLock;

/// A set of ordered values with deterministic (sorted) enumeration.
///
/// The slot engine stores one `KeySet<String>` per slot; lookups read the
/// member list while mutations insert and remove single keys. The lock makes
/// the set safe under concurrent readers, and the `BTreeSet` underneath makes
/// [`items`](Self::items) return members in key order — dispatch results must
/// not depend on insertion history.
#[derive(Debug, Default)]
pub struct KeySet<T: Ord + Clone> {
    inner: RwLock<BTreeSet<T>>,
}

impl<T: Ord + Clone> KeySet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeSet::new()),
        }
    }

    /// Create a set holding the given values.
    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            inner: RwLock::new(items.into_iter().collect()),
        }
    }

    /// Insert a value. Returns `false` if it was already present.
    pub fn insert(&self, value: T) -> bool {
        self.inner.write().expect("lock poisoned").insert(value)
    }

    /// Remove a value. Returns `false` if it was not present.
    pub fn remove<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.inner.write().expect("lock poisoned").remove(value)
    }

    /// Whether the value is in the set.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.inner.read().expect("lock poisoned").contains(value)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("lock poisoned").is_empty()
    }

    /// All members in ascending order.
    pub fn items(&self) -> Vec<T> {
        self.inner
            .read()
            .expect("lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Remove all members.
    pub fn clear(&self) {
        self.inner.write().expect("lock poisoned").clear();
    }
}

impl<T: Ord + Clone> Clone for KeySet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: RwLock::new(self.inner.read().expect("lock poisoned").clone()),
        }
    }
}

impl<T: Ord + Clone> FromIterator<T> for KeySet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::with_items(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove_contains() {
        let set = KeySet::new();
        assert!(set.insert("b".to_string()));
        assert!(set.insert("a".to_string()));
        assert!(!set.insert("a".to_string()), "duplicate insert must report false");
        assert!(set.contains("a"));
        assert_eq!(set.len(), 2);

        assert!(set.remove("a"));
        assert!(!set.remove("a"));
        assert!(!set.contains("a"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_items_sorted_regardless_of_insertion_order() {
        let set = KeySet::new();
        for key in ["node_3", "node_1", "node_2"] {
            set.insert(key.to_string());
        }
        assert_eq!(set.items(), vec!["node_1", "node_2", "node_3"]);
    }

    #[test]
    fn test_clear_and_empty() {
        let set = KeySet::with_items(["x".to_string(), "y".to_string()]);
        assert!(!set.is_empty());
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.items(), Vec::<String>::new());
    }

    #[test]
    fn test_concurrent_readers() {
        use std::sync::Arc;

        let set = Arc::new(KeySet::with_items((0..100).collect::<Vec<i32>>()));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let set = set.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    assert!(set.contains(&i));
                }
                set.items().len()
            }));
        }
        for h in handles {
            assert_eq!(h.join().unwrap(), 100);
        }
    }
}
