//! Error types for the dispatch contract boundary.

/// Errors surfaced by dispatcher construction and lookup.
///
/// Mutations are deliberately forgiving — duplicate `add` and unknown
/// `remove`/`update_weight` are no-ops — so errors only arise from invalid
/// construction parameters, an exhausted AnchorHash capacity, or a lookup
/// against an empty population.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A lookup found no node able to serve it.
    #[error("no nodes available for dispatch")]
    NoNodes,

    /// AnchorHash cannot host more nodes than its fixed bucket capacity.
    #[error("bucket capacity exhausted: all {capacity} buckets in use")]
    CapacityExhausted {
        /// The fixed capacity declared at construction.
        capacity: u32,
    },

    /// Maglev table sizes must be prime so every preference sequence is a
    /// permutation of the table.
    #[error("lookup table size {size} is not prime")]
    TableSizeNotPrime {
        /// The rejected table size.
        size: usize,
    },

    /// Weighted dispatchers require node weights of at least 1.
    #[error("node {key} has invalid weight {weight}; weights must be >= 1")]
    InvalidWeight {
        /// Key of the offending node.
        key: String,
        /// The rejected weight.
        weight: u32,
    },

    /// A construction parameter is out of range.
    #[error("invalid {name}: {reason}")]
    InvalidParameter {
        /// Which parameter was rejected.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}
