//! Pluggable randomness for the simulator.
//!
//! Every noisy reading and every fault roll draws from a [`RandomSource`],
//! so a seeded source replays a run exactly and tests can pin the noise.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A source of uniform samples in `[0, 1)`.
pub trait RandomSource {
    fn next_f64(&mut self) -> f64;

    /// Uniform noise in `[-span/2, span/2)`.
    fn noise(&mut self, span: f64) -> f64 {
        (self.next_f64() - 0.5) * span
    }
}

/// Seedable pseudo-random source backed by [`StdRng`].
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seed from the operating system's entropy source.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

/// Always returns the same sample.
///
/// At 0.5 every noise term is exactly zero, which makes physics steps
/// fully predictable.
#[derive(Debug, Clone, Copy)]
pub struct ConstantRandom(pub f64);

impl RandomSource for ConstantRandom {
    fn next_f64(&mut self) -> f64 {
        self.0
    }
}
