// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Deterministic, per-ring RNG seeding so parallel runs reproduce
//! bit-for-bit (§5 "Ordering", §9 "RNG").

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Derive a ring-local RNG from a run seed and ring index. Never derived
/// from wall-clock time.
pub fn ring_rng(run_seed: u64, ring_index: usize) -> StdRng {
    // A simple, well-distributed mix; this crate doesn't need
    // cryptographic properties, only reproducibility and decorrelation
    // between adjacent ring indices.
    let mixed = run_seed
        ^ (ring_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ 0xD1B5_4A32_D192_ED03;
    StdRng::seed_from_u64(mixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn same_seed_and_ring_reproduce() {
        let mut a = ring_rng(42, 3);
        let mut b = ring_rng(42, 3);
        let xs: Vec<f64> = (0..8).map(|_| a.gen::<f64>()).collect();
        let ys: Vec<f64> = (0..8).map(|_| b.gen::<f64>()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn different_rings_decorrelate() {
        let mut a = ring_rng(42, 3);
        let mut b = ring_rng(42, 4);
        let x: f64 = a.gen();
        let y: f64 = b.gen();
        assert!((x - y).abs() > 1e-12);
    }
}
