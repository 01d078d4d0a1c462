//! A coarse-grained ring folded onto a fixed slot array.
//!
//! Replica hashes are computed exactly as for the ring, but instead of a
//! sorted search per lookup the ring is collapsed once: every adjacent
//! replica pair claims the slot range between the two hashes (right-shifted
//! into the slot space), so a lookup is a shift plus a short forward scan.
//! The price is a full rebuild on any population change.

use std::collections::HashMap;

use keel_hash::h64;
use keel_types::Node;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DispatchError;

/// Disarray construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisarrayConfig {
    /// Replicas per unit of weight, as for the ring.
    pub vnode_base: u32,
    /// Population size at or below which the slot array is bypassed.
    pub ring_floor_limit: usize,
    /// Number of slots the ring is folded onto.
    pub slot_count: usize,
    /// Right-shift applied to a hash to land in slot space. The slot count
    /// must fit: `slot_count <= 2^(64 - shrink_shift)`.
    pub shrink_shift: u32,
}

impl Default for DisarrayConfig {
    fn default() -> Self {
        Self {
            vnode_base: 40,
            ring_floor_limit: 1,
            slot_count: 1000,
            shrink_shift: 54,
        }
    }
}

/// Folded consistent hash ring with O(1)-ish lookups.
#[derive(Debug)]
pub struct DisarrayHash<N: Node> {
    config: DisarrayConfig,
    /// Registered nodes in insertion order; slot values index into this.
    nodes: Vec<N>,
    index: HashMap<String, usize>,
    /// Slot → index of the owning node. Slots no replica arc covers keep
    /// index 0.
    slots: Vec<usize>,
}

impl<N: Node> DisarrayHash<N> {
    /// Build from an initial population. Duplicate keys are ignored after
    /// the first occurrence.
    pub fn new(config: DisarrayConfig, nodes: Vec<N>) -> Result<Self, DispatchError> {
        if config.vnode_base == 0 {
            return Err(DispatchError::InvalidParameter {
                name: "vnode_base",
                reason: "must be at least 1".to_string(),
            });
        }
        if config.slot_count == 0 {
            return Err(DispatchError::InvalidParameter {
                name: "slot_count",
                reason: "must be at least 1".to_string(),
            });
        }
        if config.shrink_shift >= 64
            || (config.slot_count as u128) > (1u128 << (64 - config.shrink_shift))
        {
            return Err(DispatchError::InvalidParameter {
                name: "shrink_shift",
                reason: format!(
                    "slot count {} does not fit in 2^(64 - {})",
                    config.slot_count, config.shrink_shift
                ),
            });
        }

        let mut table = Self {
            config,
            nodes: Vec::new(),
            index: HashMap::new(),
            slots: vec![0; config.slot_count],
        };
        for node in nodes {
            if node.weight() == 0 {
                return Err(DispatchError::InvalidWeight {
                    key: node.key().to_string(),
                    weight: node.weight(),
                });
            }
            if table.index.contains_key(node.key()) {
                continue;
            }
            table.index.insert(node.key().to_string(), table.nodes.len());
            table.nodes.push(node);
        }
        table.rebuild();
        Ok(table)
    }

    /// Register a node and rebuild the slot array. A no-op on duplicates.
    pub fn add(&mut self, node: N) -> Result<(), DispatchError> {
        if node.weight() == 0 {
            return Err(DispatchError::InvalidWeight {
                key: node.key().to_string(),
                weight: node.weight(),
            });
        }
        if self.index.contains_key(node.key()) {
            return Ok(());
        }
        self.index.insert(node.key().to_string(), self.nodes.len());
        self.nodes.push(node);
        self.rebuild();
        Ok(())
    }

    /// Unregister a node and rebuild. A no-op on unknown keys.
    pub fn remove(&mut self, key: &str) {
        let Some(pos) = self.index.remove(key) else {
            return;
        };
        self.nodes.remove(pos);
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.key().to_string(), i))
            .collect();
        self.rebuild();
        debug!(key, "removed node from disarray table");
    }

    /// Change a node's weight and rebuild.
    pub fn update_weight(&mut self, key: &str, weight: u32) -> Result<(), DispatchError> {
        if weight == 0 {
            return Err(DispatchError::InvalidWeight {
                key: key.to_string(),
                weight,
            });
        }
        let Some(&pos) = self.index.get(key) else {
            return Ok(());
        };
        if self.nodes[pos].weight() == weight {
            return Ok(());
        }
        self.nodes[pos].set_weight(weight);
        self.rebuild();
        Ok(())
    }

    /// Dispatch a key to up to `n` distinct enabled nodes.
    ///
    /// Reduces the key hash into slot space and scans forward, skipping
    /// disabled nodes. Below the floor limit the leading enabled nodes are
    /// returned directly. Requesting zero nodes yields an empty result.
    pub fn get(&self, key: &[u8], n: usize) -> Result<Vec<&N>, DispatchError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if self.nodes.is_empty() {
            return Err(DispatchError::NoNodes);
        }
        let want = n.min(self.nodes.len());

        if self.nodes.len() <= self.config.ring_floor_limit {
            let picked: Vec<&N> = self
                .nodes
                .iter()
                .filter(|node| node.is_enabled())
                .take(want)
                .collect();
            if picked.is_empty() {
                return Err(DispatchError::NoNodes);
            }
            return Ok(picked);
        }

        let slot_count = self.config.slot_count;
        let start = (h64(key) >> self.config.shrink_shift) as usize;
        let mut picked: Vec<&N> = Vec::with_capacity(want);
        // One pass over the array is enough: further laps cannot surface new
        // nodes.
        for i in 0..slot_count {
            let node = &self.nodes[self.slots[(start + i) % slot_count]];
            if !node.is_enabled() || picked.iter().any(|p| p.key() == node.key()) {
                continue;
            }
            picked.push(node);
            if picked.len() == want {
                break;
            }
        }
        if picked.is_empty() {
            return Err(DispatchError::NoNodes);
        }
        Ok(picked)
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Look up a registered node by key.
    pub fn node(&self, key: &str) -> Option<&N> {
        self.index.get(key).map(|&pos| &self.nodes[pos])
    }

    /// Mutable access to a registered node, e.g. to soft-disable it.
    pub fn node_mut(&mut self, key: &str) -> Option<&mut N> {
        self.index.get(key).copied().map(|pos| &mut self.nodes[pos])
    }

    /// Fold the current population onto the slot array.
    fn rebuild(&mut self) {
        let slot_count = self.config.slot_count;
        let shift = self.config.shrink_shift;
        self.slots = vec![0; slot_count];
        if self.nodes.is_empty() {
            return;
        }

        let mut points: Vec<(u64, usize)> = Vec::new();
        for (pos, node) in self.nodes.iter().enumerate() {
            let count = node.weight() * self.config.vnode_base;
            for i in 0..count {
                points.push((h64(format!("{}_{i}", node.key()).as_bytes()), pos));
            }
        }
        points.sort_unstable_by_key(|&(hash, _)| hash);

        let total = points.len();
        for (i, &(hash, owner)) in points.iter().enumerate() {
            let next = points[(i + 1) % total].0;
            let start = (hash >> shift) as usize;
            let end = (next >> shift) as usize;
            // Arithmetic guard: skip assignments that fall outside the array.
            if start >= slot_count || end >= slot_count {
                continue;
            }
            if start < end {
                for slot in start..end {
                    self.slots[slot] = owner;
                }
            } else if start == end {
                self.slots[start] = owner;
            } else {
                for slot in start..slot_count {
                    self.slots[slot] = owner;
                }
                for slot in 0..end {
                    self.slots[slot] = owner;
                }
            }
        }
    }
}
