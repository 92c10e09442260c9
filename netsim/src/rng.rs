//! Seeded randomness for simulation runs.
//!
//! Every random decision of a run (which link fails, which router gets a
//! configuration change, which packets are lost) is drawn from a [`SimRng`]
//! that was seeded explicitly. Two runs with the same seed over the same
//! topology make the same choices.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic random number generator owned by one simulation component.
#[derive(Debug, Clone)]
pub struct SimRng {
    seed: u64,
    inner: ChaCha8Rng,
}

impl SimRng {
    /// Generator seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Generator seeded from OS entropy. The chosen seed is kept so it can be reported.
    pub fn from_entropy() -> Self {
        Self::new(rand::rng().random())
    }

    /// Seed `Some`, or entropy when `None`.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::new(seed),
            None => Self::from_entropy(),
        }
    }

    /// The seed this generator started from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Independent child generator, deterministically derived from this one.
    pub fn fork(&mut self) -> SimRng {
        SimRng::new(self.inner.random())
    }

    /// Uniform value in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.inner.random::<f64>()
    }

    /// `true` with probability `p`. Out-of-range probabilities are clamped.
    pub fn random_bool(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            false
        } else if p >= 1.0 {
            true
        } else {
            self.unit() < p
        }
    }

    /// Uniform index in `0..len`, `None` when `len == 0`.
    pub fn index(&mut self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.inner.random_range(0..len))
    }

    /// Two distinct uniform indices in `0..len`, `None` when `len < 2`.
    pub fn pick_pair(&mut self, len: usize) -> Option<(usize, usize)> {
        if len < 2 {
            return None;
        }
        let first = self.inner.random_range(0..len);
        let mut second = self.inner.random_range(0..len - 1);
        if second >= first {
            second += 1;
        }
        Some((first, second))
    }
}
