//! Consistent hashing dispatchers for keel.
//!
//! Every dispatcher maps an arbitrary byte-string key onto one or a few
//! nodes drawn from a mutable population, while keeping the number of keys
//! whose assignment changes on membership changes small. The schemes share
//! one contract (build, `get`, `add`, `remove`, and `update_weight` where
//! weighted) but trade space, lookup cost and stability very differently:
//!
//! - [`RingHash`] — classic Karger ring with weighted virtual replicas.
//! - [`DisarrayHash`] — a ring folded onto a fixed slot array for O(1) reads.
//! - [`RendezvousHash`] — highest-random-weight over the raw node list.
//! - [`JumpHash`] — Lamping–Veach jump over positional buckets.
//! - [`MaglevHash`] — prime-sized lookup table with per-node permutations.
//! - [`AnchorHash`] — fixed bucket capacity, O(1) add/remove, PRNG probing.
//! - [`DxHash`] — power-of-two probe table with a free-index stack.
//! - [`SlotHash`] — slot-quota weighted rendezvous with active rebalancing
//!   (see [`rebalance`] for the background task).
//!
//! Dispatch is read-only once a table is built; mutations are not internally
//! synchronised and must be serialised by the caller.

pub mod anchor;
pub mod disarray;
pub mod dx;
pub mod error;
pub mod jump;
pub mod maglev;
pub mod rebalance;
pub mod rendezvous;
pub mod ring;
pub mod slot;

pub use anchor::AnchorHash;
pub use disarray::{DisarrayConfig, DisarrayHash};
pub use dx::DxHash;
pub use error::DispatchError;
pub use jump::JumpHash;
pub use maglev::MaglevHash;
pub use rebalance::{RebalanceConfig, RebalancerHandle, TimeWindow};
pub use rendezvous::RendezvousHash;
pub use ring::{RingConfig, RingHash};
pub use slot::{SlotConfig, SlotHash};
