//! Injectable randomness
//!
//! Every random draw made by the state machine and the fault generators goes
//! through [`RandomSource`], so tests can script the exact sequence of draws.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform random draws
///
/// Only [`RandomSource::next_f64`] is required; the integer and float helpers
/// are derived from it so a scripted source controls every draw.
pub trait RandomSource: Send {
    /// Uniform draw in `[0, 1)`
    fn next_f64(&mut self) -> f64;

    /// Uniform integer in the inclusive range `[lo, hi]`
    fn int_in(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        let width = i128::from(hi) - i128::from(lo);
        let offset = (self.next_f64() * (width + 1) as f64).floor() as i128;
        let value = i128::from(lo) + offset.clamp(0, width);
        i64::try_from(value).unwrap_or(hi)
    }

    /// Uniform float in `[lo, hi)`
    fn float_in(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.next_f64() * (hi - lo)
    }

    /// True with the given probability
    fn chance(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }

    /// Uniform index into a collection of `len` items (`len` must be non-zero)
    fn pick(&mut self, len: usize) -> usize {
        self.int_in(0, len.saturating_sub(1) as i64) as usize
    }
}

/// Production random source backed by `StdRng`
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    /// Seed from operating system entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic source for reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for StdRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}
