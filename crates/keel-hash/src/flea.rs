//! Four-register "flea" PRNG (Jenkins' small fast generator).
//!
//! AnchorHash needs a cheap stream of fresh 32-bit values per lookup: one
//! per removed-bucket hop. Re-hashing the key with a new seed each hop would
//! dominate the lookup cost, so the key's 64-bit hash seeds this generator
//! once and each hop advances it by a single round.

const FLEA_SEED: u32 = 0xf1ea_5eed;
const INIT_ROUNDS: usize = 3;

/// A four-register shift-rotate PRNG seeded from a single `u64`.
///
/// Deterministic: the same seed always yields the same stream, which is what
/// makes AnchorHash lookups reproducible across processes.
#[derive(Debug, Clone, Copy)]
pub struct Flea {
    a: u32,
    b: u32,
    c: u32,
    d: u32,
}

impl Flea {
    /// Seed the generator and run the warm-up rounds.
    pub fn new(seed: u64) -> Self {
        let folded = (seed >> 32) as u32 ^ seed as u32;
        let mut flea = Self {
            a: FLEA_SEED,
            b: folded,
            c: folded,
            d: folded,
        };
        for _ in 0..INIT_ROUNDS {
            flea.round();
        }
        flea
    }

    /// The current output word without advancing the state.
    pub fn current(&self) -> u32 {
        self.d
    }

    /// Advance one round and return the new output word.
    pub fn next(&mut self) -> u32 {
        self.round();
        self.d
    }

    fn round(&mut self) {
        let e = self.a.wrapping_sub(self.b.rotate_left(27));
        self.a = self.b ^ self.c.rotate_left(17);
        self.b = self.c.wrapping_add(self.d);
        self.c = self.d.wrapping_add(e);
        self.d = e.wrapping_add(self.a);
    }
}
