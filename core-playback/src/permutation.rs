//! Seeded permutations.
//!
//! The same seed over the same length always yields the same order, which is
//! what lets a persisted `(seed, cursor)` pair resume a shuffle after restart.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic generator for `seed`.
pub fn rng_for(seed: i64) -> StdRng {
    StdRng::seed_from_u64(seed as u64)
}

/// In-place Fisher-Yates shuffle.
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Order in which the indices `0..len` are visited for `seed`.
pub fn permutation(len: usize, seed: i64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    shuffle(&mut order, &mut rng_for(seed));
    order
}
