//! Slot-quota weighted rendezvous hashing.
//!
//! A fixed array of slots decouples the key space from the node set: keys
//! reduce onto a slot, and each node owns a weight-proportional quota of
//! slots. Which slots a node takes is driven by a per-(node, slot) score —
//! an exponential-race transform of the hash, so the natural "winner" of a
//! slot is the same node a rendezvous race would pick. Weight changes move
//! only a quota-delta worth of slots, and a cooperative rebalance pass
//! (see [`crate::rebalance`]) migrates members from crowded slots into
//! empty ones a batch at a time.

use std::collections::HashMap;

use keel_hash::h64;
use keel_types::{KeySet, Node};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DispatchError;

/// Slot engine construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Number of slots keys are reduced onto.
    pub slot_count: usize,
    /// Weight corresponding to one full share of the slot array: a node's
    /// quota is `round(weight / weight_base × slot_count)`, floored at 1.
    pub weight_base: u32,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            slot_count: 1000,
            weight_base: 1000,
        }
    }
}

/// Candidate slot considered by `take_slots`, in claim-preference order.
struct SlotBid {
    slot: usize,
    occupancy: usize,
    /// Own score minus the best score any node has for the slot.
    score_gap: f64,
}

/// Slot currently held, in release-preference order.
struct HeldSlot {
    slot: usize,
    occupancy: usize,
    score: f64,
}

/// Weighted slot-table dispatcher.
#[derive(Debug)]
pub struct SlotHash<N: Node> {
    config: SlotConfig,
    pub(crate) nodes: HashMap<String, N>,
    /// Per-node score vector, one entry per slot.
    pub(crate) scores: HashMap<String, Vec<f64>>,
    /// Per-node target slot count.
    pub(crate) quotas: HashMap<String, usize>,
    /// Slot → keys of the nodes currently owning it.
    pub(crate) slots: Vec<KeySet<String>>,
}

impl<N: Node> SlotHash<N> {
    /// Build from an initial population.
    ///
    /// Nodes claim their quotas in descending weight order (key order
    /// breaking ties), which makes the built table a pure function of the
    /// input set. Duplicate keys are ignored after the first occurrence.
    pub fn new(config: SlotConfig, nodes: Vec<N>) -> Result<Self, DispatchError> {
        if config.slot_count == 0 {
            return Err(DispatchError::InvalidParameter {
                name: "slot_count",
                reason: "must be at least 1".to_string(),
            });
        }
        if config.weight_base == 0 {
            return Err(DispatchError::InvalidParameter {
                name: "weight_base",
                reason: "must be at least 1".to_string(),
            });
        }

        let mut table = Self {
            config,
            nodes: HashMap::new(),
            scores: HashMap::new(),
            quotas: HashMap::new(),
            slots: (0..config.slot_count).map(|_| KeySet::new()).collect(),
        };
        for node in nodes {
            if node.weight() == 0 {
                return Err(DispatchError::InvalidWeight {
                    key: node.key().to_string(),
                    weight: node.weight(),
                });
            }
            if table.nodes.contains_key(node.key()) {
                continue;
            }
            table.register(node);
        }

        let mut order: Vec<(u32, String)> = table
            .nodes
            .values()
            .map(|n| (n.weight(), n.key().to_string()))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        for (_, key) in order {
            let quota = table.quotas[&key];
            table.take_slots(&key, quota);
        }
        Ok(table)
    }

    /// Register a node and let it claim its quota. A no-op on duplicates.
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
        self.register(node);
        let quota = self.quotas[&key];
        self.take_slots(&key, quota);
        debug!(%key, quota, "added node to slot table");
        Ok(())
    }

    /// Soft removal: the node keeps its slots but stops appearing in
    /// dispatch results. A no-op on unknown keys.
    pub fn soft_remove(&mut self, key: &str) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.set_enabled(false);
            debug!(key, "node soft-removed");
        }
    }

    /// Undo a soft removal. A no-op on unknown keys.
    pub fn soft_recover(&mut self, key: &str) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.set_enabled(true);
            debug!(key, "node soft-recovered");
        }
    }

    /// Hard removal: delete the node and purge it from every slot.
    /// A no-op on unknown keys.
    pub fn hard_remove(&mut self, key: &str) {
        if self.nodes.remove(key).is_none() {
            return;
        }
        self.scores.remove(key);
        self.quotas.remove(key);
        for slot in &self.slots {
            slot.remove(key);
        }
        debug!(key, "node hard-removed from slot table");
    }

    /// Recompute a node's quota and take or release the difference.
    /// A no-op on unknown keys or unchanged weight.
    pub fn update_weight(&mut self, key: &str, weight: u32) -> Result<(), DispatchError> {
        if weight == 0 {
            return Err(DispatchError::InvalidWeight {
                key: key.to_string(),
                weight,
            });
        }
        let Some(node) = self.nodes.get_mut(key) else {
            return Ok(());
        };
        if node.weight() == weight {
            return Ok(());
        }
        node.set_weight(weight);
        let old_quota = self.quotas[key];
        let new_quota = self.quota_for(weight);
        self.quotas.insert(key.to_string(), new_quota);
        if new_quota > old_quota {
            self.take_slots(key, new_quota - old_quota);
        } else if new_quota < old_quota {
            self.release_slots(key, old_quota - new_quota);
        }
        debug!(key, weight, old_quota, new_quota, "node weight updated");
        Ok(())
    }

    /// Dispatch a key to the enabled owners of its slot.
    ///
    /// Returns an empty vector when the slot is unowned or every owner is
    /// disabled; owners come back in key order.
    pub fn get(&self, key: &[u8]) -> Vec<&N> {
        let slot = (h64(key) as usize) % self.config.slot_count;
        self.slots[slot]
            .items()
            .iter()
            .filter_map(|owner| self.nodes.get(owner))
            .filter(|node| node.is_enabled())
            .collect()
    }

    /// Migrate members of crowded slots into empty ones, at most `batch`
    /// moves per call.
    ///
    /// The most crowded slots shed first, each keeping its best-scoring
    /// member; the migrants with the lowest scores leave first. Returns the
    /// number of moves performed — zero when there is no empty slot or no
    /// crowded slot.
    pub fn rebalance(&mut self, batch: usize) -> usize {
        let mut empty: Vec<usize> = Vec::new();
        let mut crowded: Vec<(usize, usize)> = Vec::new();
        for (slot, owners) in self.slots.iter().enumerate() {
            let occupancy = owners.len();
            if occupancy == 0 {
                empty.push(slot);
            } else if occupancy > 1 {
                crowded.push((slot, occupancy - 1));
            }
        }
        if empty.is_empty() || crowded.is_empty() {
            return 0;
        }
        crowded.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut moved = 0usize;
        let mut assign = 0usize;
        for (slot, _) in crowded {
            if moved >= batch || assign >= empty.len() {
                break;
            }
            let mut members: Vec<(String, f64)> = self.slots[slot]
                .items()
                .into_iter()
                .map(|owner| {
                    let score = self
                        .scores
                        .get(&owner)
                        .map(|scores| scores[slot])
                        .unwrap_or(0.0);
                    (owner, score)
                })
                .collect();
            members.sort_by(|a, b| a.1.total_cmp(&b.1));
            // The best-scoring member stays; the rest are migration
            // candidates, lowest score first.
            let candidates = members.len().saturating_sub(1);
            for (owner, _) in members.into_iter().take(candidates) {
                if moved >= batch || assign >= empty.len() {
                    break;
                }
                self.slots[slot].remove(&owner);
                self.slots[empty[assign]].insert(owner);
                assign += 1;
                moved += 1;
            }
        }
        if moved > 0 {
            debug!(moved, "rebalanced slot table");
        }
        moved
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// A node's current slot-count target.
    pub fn quota(&self, key: &str) -> Option<usize> {
        self.quotas.get(key).copied()
    }

    /// Number of slots currently containing the node.
    pub fn assigned_count(&self, key: &str) -> usize {
        self.slots.iter().filter(|slot| slot.contains(key)).count()
    }

    /// Slots currently containing the node, ascending.
    pub fn node_slots(&self, key: &str) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, owners)| owners.contains(key))
            .map(|(slot, _)| slot)
            .collect()
    }

    /// Number of slots with no owner.
    pub fn empty_slot_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_empty()).count()
    }

    /// The full slot table: owner keys per slot, in key order.
    pub fn slot_table(&self) -> Vec<Vec<String>> {
        self.slots.iter().map(|slot| slot.items()).collect()
    }

    /// Look up a registered node by key.
    pub fn node(&self, key: &str) -> Option<&N> {
        self.nodes.get(key)
    }

    /// Store the node and compute its quota and score vector.
    fn register(&mut self, node: N) {
        let key = node.key().to_string();
        self.quotas.insert(key.clone(), self.quota_for(node.weight()));
        self.scores.insert(key.clone(), self.score_vector(&key));
        self.nodes.insert(key, node);
    }

    fn quota_for(&self, weight: u32) -> usize {
        let estimated = (f64::from(weight) / f64::from(self.config.weight_base)
            * self.config.slot_count as f64)
            .round() as usize;
        estimated.max(1)
    }

    /// Score of one node for every slot: `1 / -ln(u)` with `u` the hash of
    /// `node_key ++ "_" ++ slot` normalised into (0, 1]. The transform turns
    /// uniform hashes into an exponential race whose argmax matches
    /// weighted rendezvous.
    fn score_vector(&self, key: &str) -> Vec<f64> {
        (0..self.config.slot_count)
            .map(|slot| {
                let h = h64(format!("{key}_{slot}").as_bytes());
                let normalised = (h as f64 + 1.0) / (u64::MAX as f64);
                1.0 / -normalised.ln()
            })
            .collect()
    }

    /// Claim `count` additional slots for the node: empty slots first, then
    /// the slots where its score comes closest to (or beats) the current
    /// best.
    fn take_slots(&mut self, key: &str, count: usize) {
        let Some(own_scores) = self.scores.get(key) else {
            return;
        };
        let mut bids: Vec<SlotBid> = Vec::with_capacity(self.config.slot_count);
        for slot in 0..self.config.slot_count {
            if self.slots[slot].contains(key) {
                continue;
            }
            let best = self
                .scores
                .values()
                .map(|scores| scores[slot])
                .fold(0.0f64, f64::max);
            bids.push(SlotBid {
                slot,
                occupancy: self.slots[slot].len(),
                score_gap: own_scores[slot] - best,
            });
        }
        bids.sort_by(|a, b| {
            a.occupancy
                .cmp(&b.occupancy)
                .then_with(|| b.score_gap.total_cmp(&a.score_gap))
                .then_with(|| a.slot.cmp(&b.slot))
        });
        for bid in bids.into_iter().take(count) {
            self.slots[bid.slot].insert(key.to_string());
        }
    }

    /// Give up `count` of the node's slots: the most crowded slots first,
    /// lowest own score breaking ties.
    fn release_slots(&mut self, key: &str, count: usize) {
        let mut held: Vec<HeldSlot> = Vec::new();
        for (slot, owners) in self.slots.iter().enumerate() {
            if owners.contains(key) {
                held.push(HeldSlot {
                    slot,
                    occupancy: owners.len(),
                    score: self
                        .scores
                        .get(key)
                        .map(|scores| scores[slot])
                        .unwrap_or(0.0),
                });
            }
        }
        held.sort_by(|a, b| {
            b.occupancy
                .cmp(&a.occupancy)
                .then_with(|| a.score.total_cmp(&b.score))
                .then_with(|| a.slot.cmp(&b.slot))
        });
        for held_slot in held.into_iter().take(count) {
            self.slots[held_slot.slot].remove(key);
        }
    }
}
