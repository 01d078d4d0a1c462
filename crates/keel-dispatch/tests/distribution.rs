//! Cross-algorithm balance checks: with a uniform fleet, per-node key
//! counts should cluster tightly around the mean.

use keel_dispatch::{
    AnchorHash, DisarrayConfig, DisarrayHash, DxHash, JumpHash, MaglevHash, RendezvousHash,
    RingConfig, RingHash, SlotConfig, SlotHash,
};
use keel_types::{Node, WeightedNode};
use std::collections::HashMap;

fn fleet(count: usize) -> Vec<WeightedNode> {
    (0..count)
        .map(|i| WeightedNode::new(format!("node_{i}"), 1, true))
        .collect()
}

fn keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("key_{i}")).collect()
}

fn spread(counts: &HashMap<String, usize>, node_count: usize, key_count: usize) -> (f64, f64) {
    let mean = key_count as f64 / node_count as f64;
    let variance = (0..node_count)
        .map(|i| {
            let count = *counts.get(&format!("node_{i}")).unwrap_or(&0) as f64;
            (count - mean) * (count - mean)
        })
        .sum::<f64>()
        / node_count as f64;
    (mean, variance.sqrt())
}

fn assert_balanced(counts: &HashMap<String, usize>, nodes: usize, keys: usize, factor: f64) {
    let (mean, stddev) = spread(counts, nodes, keys);
    let bound = factor * mean.sqrt();
    assert!(
        stddev <= bound,
        "per-node spread too wide: stddev {stddev:.1}, bound {bound:.1} (mean {mean:.1})"
    );
}

#[test]
fn test_ring_balance() {
    let nodes = 100;
    let table = RingHash::new(RingConfig::default(), fleet(nodes)).unwrap();
    let mut counts = HashMap::new();
    let key_list = keys(10_000);
    for key in &key_list {
        let picked = table.get(key.as_bytes(), 1).unwrap();
        *counts.entry(picked[0].key().to_string()).or_insert(0) += 1;
    }
    assert_balanced(&counts, nodes, key_list.len(), 5.0);
}

#[test]
fn test_disarray_balance() {
    let nodes = 100;
    let table = DisarrayHash::new(DisarrayConfig::default(), fleet(nodes)).unwrap();
    let mut counts = HashMap::new();
    let key_list = keys(10_000);
    for key in &key_list {
        let picked = table.get(key.as_bytes(), 1).unwrap();
        *counts.entry(picked[0].key().to_string()).or_insert(0) += 1;
    }
    // Folding onto 1000 slots quantises arcs; the spread is wider than the
    // true ring's.
    assert_balanced(&counts, nodes, key_list.len(), 10.0);
}

#[test]
fn test_rendezvous_balance() {
    let nodes = 100;
    let table = RendezvousHash::new(fleet(nodes)).unwrap();
    let mut counts = HashMap::new();
    let key_list = keys(10_000);
    for key in &key_list {
        let picked = table.get(key.as_bytes()).unwrap();
        *counts.entry(picked.key().to_string()).or_insert(0) += 1;
    }
    assert_balanced(&counts, nodes, key_list.len(), 5.0);
}

#[test]
fn test_jump_balance() {
    let nodes = 100;
    let table = JumpHash::new(fleet(nodes));
    let mut counts = HashMap::new();
    let key_list = keys(10_000);
    for key in &key_list {
        let picked = table.get(key.as_bytes()).unwrap();
        *counts.entry(picked.key().to_string()).or_insert(0) += 1;
    }
    assert_balanced(&counts, nodes, key_list.len(), 5.0);
}

#[test]
fn test_maglev_balance() {
    let nodes = 100;
    let table = MaglevHash::new(2039, fleet(nodes)).unwrap();
    let mut counts = HashMap::new();
    let key_list = keys(10_000);
    for key in &key_list {
        let picked = table.get(key.as_bytes()).unwrap();
        *counts.entry(picked.key().to_string()).or_insert(0) += 1;
    }
    assert_balanced(&counts, nodes, key_list.len(), 2.0);
}

#[test]
fn test_anchor_balance() {
    let nodes = 100;
    let table = AnchorHash::new(128, fleet(nodes)).unwrap();
    let mut counts = HashMap::new();
    let key_list = keys(10_000);
    for key in &key_list {
        let picked = table.get(key.as_bytes()).unwrap();
        *counts.entry(picked.key().to_string()).or_insert(0) += 1;
    }
    assert_balanced(&counts, nodes, key_list.len(), 2.0);
}

#[test]
fn test_slot_balance() {
    let nodes = 100;
    // weight_base 100 with unit weights: quota 10 each, 1000 slots exactly
    // covered.
    let config = SlotConfig {
        slot_count: 1000,
        weight_base: 100,
    };
    let table = SlotHash::new(config, fleet(nodes)).unwrap();
    let mut counts = HashMap::new();
    let key_list = keys(10_000);
    for key in &key_list {
        let owners = table.get(key.as_bytes());
        assert!(!owners.is_empty(), "slot for {key} has no owner");
        *counts.entry(owners[0].key().to_string()).or_insert(0) += 1;
    }
    assert_balanced(&counts, nodes, key_list.len(), 2.0);
}

#[test]
fn test_dx_balance_is_loose_but_bounded() {
    // Home-slot collisions can orphan the odd node, so the probe table only
    // promises a loose bound.
    let nodes = 32;
    let table = DxHash::new(2048, fleet(nodes));
    let mut counts = HashMap::new();
    let key_list = keys(10_000);
    for key in &key_list {
        let picked = table.get(key.as_bytes()).unwrap();
        *counts.entry(picked.key().to_string()).or_insert(0) += 1;
    }
    let (mean, stddev) = spread(&counts, nodes, key_list.len());
    assert!(
        stddev < mean,
        "probe table spread pathological: stddev {stddev:.1} vs mean {mean:.1}"
    );
}
