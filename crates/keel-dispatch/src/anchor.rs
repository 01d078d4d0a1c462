//! AnchorHash: constant-time add/remove within a fixed bucket capacity.
//!
//! All buckets are allocated up front. A removed bucket remembers the
//! working-set size at the moment of its removal plus a redirect to the
//! bucket that inherited its role, so a lookup can replay history: re-roll a
//! position with a cheap PRNG, follow redirects past later removals, repeat
//! until a working bucket is hit. Removing a node moves only its own keys;
//! adding one moves an exact `1/N` expected fraction.

use std::collections::HashMap;

use keel_hash::{fast_mod, h64, Flea};
use keel_types::Node;
use tracing::debug;

use crate::error::DispatchError;

/// Bucket-based consistent hash with a fixed capacity.
///
/// The capacity declared at construction must cover the peak node count
/// ever hosted; [`add`](Self::add) fails once every bucket is working.
#[derive(Debug)]
pub struct AnchorHash<N: Node> {
    capacity: u32,
    /// Working-set size at the moment of each bucket's removal; 0 means the
    /// bucket is currently working.
    removed_at: Vec<u32>,
    /// Replacement bucket to follow when a removed bucket is hit
    /// (self-loop while working).
    redirect: Vec<u32>,
    /// Positional index of the working set: position → bucket.
    working: Vec<u32>,
    /// Inverse of `working`: bucket → position.
    position: Vec<u32>,
    /// Stack of removed buckets; the next `add` reuses the top.
    free: Vec<u32>,
    /// Current working population size.
    count: u32,
    /// Bucket → hosted node.
    nodes: Vec<Option<N>>,
    buckets: HashMap<String, u32>,
}

impl<N: Node> AnchorHash<N> {
    /// Build with a fixed bucket capacity and an initial population.
    ///
    /// Fails if the population already exceeds the capacity. Duplicate keys
    /// are ignored after the first occurrence.
    pub fn new(capacity: u32, nodes: Vec<N>) -> Result<Self, DispatchError> {
        if capacity == 0 {
            return Err(DispatchError::InvalidParameter {
                name: "capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        let size = capacity as usize;
        // Every bucket starts "removed at population level b", the state a
        // full anchor reaches after removing buckets capacity-1 down to 0 in
        // order. Lookup correctness depends on this: a re-rolled position is
        // always reduced modulo the removal level, so the walk strictly
        // descends toward the working set.
        let mut table = Self {
            capacity,
            removed_at: (0..capacity).collect(),
            redirect: (0..capacity).collect(),
            working: (0..capacity).collect(),
            position: (0..capacity).collect(),
            free: (0..capacity).rev().collect(),
            count: 0,
            nodes: (0..capacity).map(|_| None).collect(),
            buckets: HashMap::new(),
        };
        for node in nodes {
            table.add(node)?;
        }
        Ok(table)
    }

    /// Assign a node to the most recently freed bucket. O(1).
    ///
    /// A no-op on duplicate keys; fails when every bucket is working.
    pub fn add(&mut self, node: N) -> Result<(), DispatchError> {
        if self.buckets.contains_key(node.key()) {
            return Ok(());
        }
        let Some(bucket) = self.free.pop() else {
            return Err(DispatchError::CapacityExhausted {
                capacity: self.capacity,
            });
        };
        let b = bucket as usize;
        self.removed_at[b] = 0;
        let tail = self.working[self.count as usize] as usize;
        self.position[tail] = self.count;
        self.working[self.position[b] as usize] = bucket;
        self.redirect[b] = bucket;
        self.buckets.insert(node.key().to_string(), bucket);
        debug!(key = node.key(), bucket, "assigned node to bucket");
        self.nodes[b] = Some(node);
        self.count += 1;
        Ok(())
    }

    /// Release a node's bucket back to the free stack. O(1).
    ///
    /// A no-op on unknown keys.
    pub fn remove(&mut self, key: &str) {
        let Some(bucket) = self.buckets.remove(key) else {
            return;
        };
        let b = bucket as usize;
        debug_assert_eq!(self.removed_at[b], 0, "removing a non-working bucket");
        self.free.push(bucket);
        self.count -= 1;
        self.removed_at[b] = self.count;
        let tail = self.working[self.count as usize];
        let pos = self.position[b];
        self.working[pos as usize] = tail;
        self.redirect[b] = tail;
        self.position[tail as usize] = pos;
        self.nodes[b] = None;
        debug!(key, bucket, "released bucket");
    }

    /// Dispatch a key to its bucket's node.
    ///
    /// Re-rolls positions with a PRNG seeded from the key hash, following
    /// redirects through removed buckets. The loop bounds only trip on
    /// corrupted state; they assert in debug builds and fall back to a
    /// deterministic pick in release builds.
    pub fn get(&self, key: &[u8]) -> Result<&N, DispatchError> {
        if self.count == 0 {
            return Err(DispatchError::NoNodes);
        }
        let mut flea = Flea::new(h64(key));
        let mut bucket = fast_mod(flea.current(), self.capacity);
        let max_hops = self.capacity.saturating_mul(2);
        let mut hops = 0u32;
        'walk: while self.removed_at[bucket as usize] > 0 {
            if hops == max_hops {
                debug_assert!(false, "bucket walk exceeded {max_hops} hops");
                bucket = self.working[0];
                break;
            }
            let level = self.removed_at[bucket as usize];
            let mut candidate = fast_mod(flea.next(), level);
            let mut steps = 0u32;
            // Follow redirects past buckets removed at or after this level:
            // this re-derives where the key lived before the removal.
            while self.removed_at[candidate as usize] >= level {
                if steps == self.capacity {
                    debug_assert!(false, "redirect chain exceeded capacity");
                    break 'walk;
                }
                candidate = self.redirect[candidate as usize];
                steps += 1;
            }
            bucket = candidate;
            hops += 1;
        }
        self.nodes[bucket as usize]
            .as_ref()
            .ok_or(DispatchError::NoNodes)
    }

    /// Current number of hosted nodes.
    pub fn node_count(&self) -> u32 {
        self.count
    }

    /// The fixed bucket capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Bucket currently hosting the given node.
    pub fn bucket_of(&self, key: &str) -> Option<u32> {
        self.buckets.get(key).copied()
    }

    /// Look up a hosted node by key.
    pub fn node(&self, key: &str) -> Option<&N> {
        self.buckets
            .get(key)
            .and_then(|&b| self.nodes[b as usize].as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_types::WeightedNode;

    fn node(key: &str) -> WeightedNode {
        WeightedNode::new(key, 1, true)
    }

    fn fleet(count: usize) -> Vec<WeightedNode> {
        (0..count).map(|i| node(&format!("n{i}"))).collect()
    }

    fn keys(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("key_{i}")).collect()
    }

    #[test]
    fn test_remove_then_add_reuses_bucket_and_moves_only_its_keys() {
        let mut table = AnchorHash::new(8, fleet(6)).unwrap();
        let keys = keys(2_000);
        let before: Vec<String> = keys
            .iter()
            .map(|k| table.get(k.as_bytes()).unwrap().key().to_string())
            .collect();

        let removed_bucket = table.bucket_of("n2").unwrap();
        table.remove("n2");
        table.add(node("fresh")).unwrap();

        // LIFO bucket reuse: the new node inherits the freed bucket.
        assert_eq!(table.bucket_of("fresh"), Some(removed_bucket));

        for (key, old) in keys.iter().zip(&before) {
            let new = table.get(key.as_bytes()).unwrap().key();
            if old != "n2" {
                assert_eq!(new, old, "key {key} moved although its node stayed");
            }
        }
    }

    #[test]
    fn test_remove_moves_only_removed_nodes_keys() {
        let mut table = AnchorHash::new(16, fleet(10)).unwrap();
        let keys = keys(2_000);
        let before: Vec<String> = keys
            .iter()
            .map(|k| table.get(k.as_bytes()).unwrap().key().to_string())
            .collect();

        table.remove("n7");

        for (key, old) in keys.iter().zip(&before) {
            let new = table.get(key.as_bytes()).unwrap().key();
            if old != "n7" {
                assert_eq!(new, old);
            } else {
                assert_ne!(new, "n7");
            }
        }
    }

    #[test]
    fn test_add_then_remove_restores_dispatch() {
        let mut table = AnchorHash::new(16, fleet(10)).unwrap();
        let keys = keys(2_000);
        let before: Vec<String> = keys
            .iter()
            .map(|k| table.get(k.as_bytes()).unwrap().key().to_string())
            .collect();

        table.add(node("temp")).unwrap();
        table.remove("temp");

        for (key, old) in keys.iter().zip(&before) {
            assert_eq!(table.get(key.as_bytes()).unwrap().key(), old);
        }
    }

    #[test]
    fn test_add_moves_keys_only_to_new_node() {
        let mut table = AnchorHash::new(16, fleet(10)).unwrap();
        let keys = keys(2_000);
        let before: Vec<String> = keys
            .iter()
            .map(|k| table.get(k.as_bytes()).unwrap().key().to_string())
            .collect();

        table.add(node("n10")).unwrap();

        for (key, old) in keys.iter().zip(&before) {
            let new = table.get(key.as_bytes()).unwrap().key();
            assert!(new == old || new == "n10", "key {key} moved to existing node {new}");
        }
    }

    #[test]
    fn test_capacity_exhaustion_is_an_error() {
        let mut table = AnchorHash::new(4, fleet(4)).unwrap();
        assert!(matches!(
            table.add(node("overflow")),
            Err(DispatchError::CapacityExhausted { capacity: 4 })
        ));
        // Idempotent re-add of a hosted node is still fine at capacity.
        table.add(node("n0")).unwrap();
        assert_eq!(table.node_count(), 4);
    }

    #[test]
    fn test_initial_population_larger_than_capacity_fails() {
        assert!(AnchorHash::new(4, fleet(5)).is_err());
    }

    #[test]
    fn test_every_key_resolves() {
        let table = AnchorHash::new(64, fleet(40)).unwrap();
        for key in keys(5_000) {
            let picked = table.get(key.as_bytes()).unwrap();
            assert!(table.bucket_of(picked.key()).is_some());
        }
    }

    #[test]
    fn test_empty_population_fails() {
        let table: AnchorHash<WeightedNode> = AnchorHash::new(8, Vec::new()).unwrap();
        assert!(matches!(table.get(b"key"), Err(DispatchError::NoNodes)));
    }

    #[test]
    fn test_unknown_remove_is_noop() {
        let mut table = AnchorHash::new(8, fleet(3)).unwrap();
        table.remove("missing");
        assert_eq!(table.node_count(), 3);
    }
}
