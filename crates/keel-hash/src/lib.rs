//! Hash primitive and numeric helpers shared by all keel dispatchers.
//!
//! The dispatchers only ever see a 64-bit seeded hash: `h64(bytes)` must be
//! deterministic across processes and uniformly distributed. Here it is the
//! first 8 bytes (little-endian) of a BLAKE3 digest over `seed ‖ bytes`.
//! The default seed is fixed so that independently built dispatchers agree
//! on every placement.
//!
//! Also provided: [`fast_mod`], Lemire's multiply-shift range reduction, and
//! [`Flea`], the four-register PRNG AnchorHash uses to re-roll probe
//! positions without rehashing the key.

mod flea;

pub use flea::Flea;

/// Seed baked into [`h64`]. Changing it remaps every key on every dispatcher.
pub const DEFAULT_SEED: u64 = 192;

/// Hash `bytes` with the library-wide default seed.
pub fn h64(bytes: &[u8]) -> u64 {
    h64_with_seed(bytes, DEFAULT_SEED)
}

/// Hash `bytes` with an explicit seed.
///
/// Distinct seeds give independent hash families; Maglev and DxHash use
/// small consecutive seeds to derive their per-node preference integers and
/// per-probe positions.
pub fn h64_with_seed(bytes: &[u8], seed: u64) -> u64 {
    let mut input = Vec::with_capacity(8 + bytes.len());
    input.extend_from_slice(&seed.to_le_bytes());
    input.extend_from_slice(bytes);
    let hash = blake3::hash(&input);
    let head: [u8; 8] = hash.as_bytes()[..8].try_into().expect("8 bytes");
    u64::from_le_bytes(head)
}

/// Lemire's fast range reduction: maps `x` into `[0, m)` via `(x · m) >> 32`.
///
/// Unbiased enough for dispatch as long as `x` is uniform over the full
/// `u32` range. See "A fast alternative to the modulo reduction"
/// (Lemire, 2016).
pub fn fast_mod(x: u32, m: u32) -> u32 {
    ((u64::from(x) * u64::from(m)) >> 32) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_h64_deterministic() {
        assert_eq!(h64(b"photoId_1"), h64(b"photoId_1"));
        assert_eq!(
            h64_with_seed(b"node_1", 7),
            h64_with_seed(b"node_1", 7),
        );
    }

    #[test]
    fn test_h64_differs_by_input() {
        assert_ne!(h64(b"node_1"), h64(b"node_2"));
    }

    #[test]
    fn test_h64_differs_by_seed() {
        assert_ne!(h64_with_seed(b"key", 0), h64_with_seed(b"key", 1));
        assert_eq!(h64(b"key"), h64_with_seed(b"key", DEFAULT_SEED));
    }

    #[test]
    fn test_h64_spreads_sequential_keys() {
        // Sequential keys must not collide and should cover both halves of
        // the u64 range.
        let mut low = 0usize;
        let mut seen = std::collections::HashSet::new();
        for i in 0..10_000u32 {
            let h = h64(format!("key_{i}").as_bytes());
            assert!(seen.insert(h), "collision at key_{i}");
            if h < u64::MAX / 2 {
                low += 1;
            }
        }
        assert!(
            (4_000..=6_000).contains(&low),
            "lopsided distribution: {low}/10000 in lower half"
        );
    }

    #[test]
    fn test_fast_mod_in_range() {
        for m in [1u32, 2, 7, 1000, 2039, u32::MAX] {
            for x in [0u32, 1, 12345, u32::MAX / 2, u32::MAX] {
                assert!(fast_mod(x, m) < m, "fast_mod({x}, {m}) out of range");
            }
        }
    }

    #[test]
    fn test_fast_mod_covers_range() {
        // With uniform inputs every residue should be reachable.
        let m = 8;
        let mut hit = vec![false; m as usize];
        for i in 0..10_000u32 {
            let x = h64(&i.to_le_bytes()) as u32;
            hit[fast_mod(x, m) as usize] = true;
        }
        assert!(hit.iter().all(|&h| h), "unreachable residues: {hit:?}");
    }
}
