//! Shared types for the keel dispatchers.
//!
//! This crate defines the [`Node`] capability every dispatcher is generic
//! over, the concrete [`WeightedNode`] implementation, and [`KeySet`], an
//! ordered set with deterministic enumeration used by the slot engine.

mod set;

pub use set::KeySet;

use serde::{Deserialize, Serialize};

/// The capability dispatchers require of a node.
///
/// A node is identified by a key that is unique within one dispatcher and
/// immutable for the node's lifetime. Weight scales how much of the key
/// space weighted dispatchers hand to the node; `enabled` is the soft-removal
/// flag — a disabled node keeps its slots and buckets but is filtered out of
/// dispatch results by the schemes that support it.
pub trait Node {
    /// Unique, immutable identifier.
    fn key(&self) -> &str;

    /// Dispatch weight, at least 1 on weighted dispatchers.
    fn weight(&self) -> u32;

    /// Whether the node currently accepts traffic.
    fn is_enabled(&self) -> bool;

    /// Update the dispatch weight.
    fn set_weight(&mut self, weight: u32);

    /// Soft-enable or soft-disable the node.
    fn set_enabled(&mut self, enabled: bool);
}

/// A plain owned node: key, weight, enabled flag.
///
/// The dispatchers take any [`Node`] implementation; this is the one used by
/// homogeneous fleets and throughout the test suites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedNode {
    key: String,
    weight: u32,
    enabled: bool,
}

impl WeightedNode {
    /// Create a node with the given key, weight and enabled flag.
    pub fn new(key: impl Into<String>, weight: u32, enabled: bool) -> Self {
        Self {
            key: key.into(),
            weight,
            enabled,
        }
    }
}

impl Node for WeightedNode {
    fn key(&self) -> &str {
        &self.key
    }

    fn weight(&self) -> u32 {
        self.weight
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_weight(&mut self, weight: u32) {
        self.weight = weight;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
