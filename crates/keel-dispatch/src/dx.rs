//! DxHash-style probe table.
//!
//! A power-of-two table maps a hashed home slot to each node; lookups probe
//! seeded hash positions until one hits an occupied slot, falling back to
//! the first registered node if every probe misses. The table doubles when
//! the load factor reaches 0.5, and a free-index stack keeps add/remove
//! at O(1).
//!
//! The probe lookup matches the observable behavior of the original
//! implementation rather than the published DxHash write algorithm: two
//! nodes whose home slots collide leave one of them reachable only through
//! the probe-miss fallback.

use std::collections::HashMap;

use keel_hash::h64_with_seed;
use keel_types::Node;
use tracing::debug;

use crate::error::DispatchError;

/// Probe-table consistent hash with a doubling table.
#[derive(Debug)]
pub struct DxHash<N: Node> {
    /// Slot → entry index, `None` when unoccupied.
    table: Vec<Option<u32>>,
    /// Entry index → node.
    entries: Vec<Option<N>>,
    index: HashMap<String, u32>,
    /// Unused entry indices.
    free: Vec<u32>,
    node_count: usize,
}

impl<N: Node> DxHash<N> {
    /// Build with an initial table size (rounded up to a power of two) and
    /// population. Duplicate keys are ignored after the first occurrence.
    pub fn new(initial_size: usize, nodes: Vec<N>) -> Self {
        let size = initial_size.max(1).next_power_of_two();
        let mut table = Self {
            table: vec![None; size],
            entries: (0..size).map(|_| None).collect(),
            index: HashMap::new(),
            free: (0..size as u32).collect(),
            node_count: 0,
        };
        for node in nodes {
            table.add(node);
        }
        table
    }

    /// Register a node at its hashed home slot. A no-op on duplicate keys.
    pub fn add(&mut self, node: N) {
        if self.index.contains_key(node.key()) {
            return;
        }
        if self.node_count >= self.table.len() / 2 {
            self.grow();
        }
        let Some(entry) = self.free.pop() else {
            return;
        };
        let key = node.key().to_string();
        let home = self.home_slot(&key);
        self.table[home] = Some(entry);
        self.entries[entry as usize] = Some(node);
        self.index.insert(key, entry);
        self.node_count += 1;
    }

    /// Unregister a node, releasing its entry. A no-op on unknown keys.
    pub fn remove(&mut self, key: &str) {
        let Some(entry) = self.index.remove(key) else {
            return;
        };
        let home = self.home_slot(key);
        self.table[home] = None;
        self.entries[entry as usize] = None;
        self.free.push(entry);
        self.node_count -= 1;
        debug!(key, "removed node from probe table");
    }

    /// Dispatch a key via up to `8 × node_count` seeded probes.
    ///
    /// If every probe misses (possible after home-slot collisions), falls
    /// back to the first registered node rather than failing.
    pub fn get(&self, key: &[u8]) -> Result<&N, DispatchError> {
        if self.node_count == 0 {
            return Err(DispatchError::NoNodes);
        }
        let size = self.table.len();
        for probe in 0..(8 * self.node_count) {
            let slot = (h64_with_seed(key, probe as u64) as usize) % size;
            if let Some(entry) = self.table[slot] {
                if let Some(node) = self.entries[entry as usize].as_ref() {
                    return Ok(node);
                }
            }
        }
        self.entries
            .iter()
            .find_map(|entry| entry.as_ref())
            .ok_or(DispatchError::NoNodes)
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Current table size (always a power of two).
    pub fn table_size(&self) -> usize {
        self.table.len()
    }

    /// Look up a registered node by key.
    pub fn node(&self, key: &str) -> Option<&N> {
        self.index
            .get(key)
            .and_then(|&entry| self.entries[entry as usize].as_ref())
    }

    fn home_slot(&self, key: &str) -> usize {
        (h64_with_seed(key.as_bytes(), 0) as usize) % self.table.len()
    }

    /// Double the table. Existing entries keep their slots; the new half
    /// only provides fresh free indices and probe targets.
    fn grow(&mut self) {
        let old = self.table.len();
        let new = old * 2;
        self.table.resize(new, None);
        self.entries.resize_with(new, || None);
        self.free.extend(old as u32..new as u32);
        debug!(from = old, to = new, "probe table grown");
    }
}
