//! Karger-style consistent hash ring with weighted virtual replicas.

use std::collections::BTreeMap;

use keel_hash::h64;
use keel_types::Node;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DispatchError;

/// Ring construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    /// Replicas per unit of weight: a node contributes `weight × vnode_base`
    /// points on the ring. Higher values trade memory and rebuild time for
    /// lower per-node variance.
    pub vnode_base: u32,
    /// Population size at or below which the ring is bypassed and `get`
    /// returns the leading nodes directly.
    pub ring_floor_limit: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            vnode_base: 40,
            ring_floor_limit: 1,
        }
    }
}

/// Consistent hash ring mapping keys to weighted nodes.
///
/// Each node owns `weight × vnode_base` pseudo-random points on a notional
/// 2⁶⁴ ring; a key is dispatched to the owners of the first points clockwise
/// of its own hash. Adding or removing one node only re-assigns the keys
/// falling into that node's arcs, roughly a `1/N` fraction.
#[derive(Debug)]
pub struct RingHash<N: Node> {
    config: RingConfig,
    /// Nodes by key, in key order so the small-population bypass is
    /// deterministic.
    nodes: BTreeMap<String, N>,
    /// Replica positions: ring position → owning node key.
    replicas: BTreeMap<u64, String>,
}

impl<N: Node> RingHash<N> {
    /// Build a ring from an initial population.
    ///
    /// Duplicate keys in `nodes` are ignored after the first occurrence.
    pub fn new(config: RingConfig, nodes: Vec<N>) -> Result<Self, DispatchError> {
        if config.vnode_base == 0 {
            return Err(DispatchError::InvalidParameter {
                name: "vnode_base",
                reason: "must be at least 1".to_string(),
            });
        }
        let mut ring = Self {
            config,
            nodes: BTreeMap::new(),
            replicas: BTreeMap::new(),
        };
        for node in nodes {
            ring.add(node)?;
        }
        Ok(ring)
    }

    /// Register a node and splice its replicas into the ring.
    ///
    /// A no-op if a node with the same key is already registered.
    pub fn add(&mut self, node: N) -> Result<(), DispatchError> {
        if node.weight() == 0 {
            return Err(DispatchError::InvalidWeight {
                key: node.key().to_string(),
                weight: node.weight(),
            });
        }
        if self.nodes.contains_key(node.key()) {
            return Ok(());
        }
        let key = node.key().to_string();
        for pos in self.replica_positions(&key, node.weight()) {
            self.replicas.insert(pos, key.clone());
        }
        debug!(%key, weight = node.weight(), "added node to ring");
        self.nodes.insert(key, node);
        Ok(())
    }

    /// Unregister a node and remove its replicas. A no-op on unknown keys.
    pub fn remove(&mut self, key: &str) {
        if let Some(node) = self.nodes.remove(key) {
            for pos in self.replica_positions(key, node.weight()) {
                self.replicas.remove(&pos);
            }
            debug!(key, "removed node from ring");
        }
    }

    /// Change a node's weight, re-splicing its replicas.
    ///
    /// A no-op on unknown keys or unchanged weight.
    pub fn update_weight(&mut self, key: &str, weight: u32) -> Result<(), DispatchError> {
        if weight == 0 {
            return Err(DispatchError::InvalidWeight {
                key: key.to_string(),
                weight,
            });
        }
        let Some(old_weight) = self.nodes.get(key).map(|n| n.weight()) else {
            return Ok(());
        };
        if old_weight == weight {
            return Ok(());
        }
        for pos in self.replica_positions(key, old_weight) {
            self.replicas.remove(&pos);
        }
        for pos in self.replica_positions(key, weight) {
            self.replicas.insert(pos, key.to_string());
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.set_weight(weight);
        }
        debug!(key, weight, "updated node weight on ring");
        Ok(())
    }

    /// Dispatch a key to up to `n` distinct enabled nodes.
    ///
    /// Walks clockwise from the key's ring position, skipping disabled
    /// nodes. With a population at or below the floor limit the ring is
    /// bypassed and the leading enabled nodes (in key order) are returned.
    /// Requesting zero nodes yields an empty result; otherwise fails if no
    /// node is enabled.
    pub fn get(&self, key: &[u8], n: usize) -> Result<Vec<&N>, DispatchError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if self.nodes.len() <= self.config.ring_floor_limit {
            let picked: Vec<&N> = self
                .nodes
                .values()
                .filter(|node| node.is_enabled())
                .take(n)
                .collect();
            if picked.is_empty() {
                return Err(DispatchError::NoNodes);
            }
            return Ok(picked);
        }

        let h = h64(key);
        let mut picked: Vec<&N> = Vec::with_capacity(n);
        let after = self.replicas.range(h..);
        let before = self.replicas.range(..h);
        for (_, owner) in after.chain(before) {
            if picked.iter().any(|node| node.key() == owner.as_str()) {
                continue;
            }
            let node = &self.nodes[owner];
            if !node.is_enabled() {
                continue;
            }
            picked.push(node);
            if picked.len() == n {
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

    /// Number of virtual-node points currently on the ring.
    pub fn vnode_count(&self) -> usize {
        self.replicas.len()
    }

    /// Look up a registered node by key.
    pub fn node(&self, key: &str) -> Option<&N> {
        self.nodes.get(key)
    }

    /// Mutable access to a registered node, e.g. to soft-disable it.
    pub fn node_mut(&mut self, key: &str) -> Option<&mut N> {
        self.nodes.get_mut(key)
    }

    fn replica_positions(&self, key: &str, weight: u32) -> Vec<u64> {
        let count = weight * self.config.vnode_base;
        (0..count)
            .map(|i| h64(format!("{key}_{i}").as_bytes()))
            .collect()
    }
}
