//! Shared random-number source.
//!
//! The kernel consumes a random source through a thin trait rather than
//! committing concrete events to a specific RNG family, per spec.md §6
//! ("a random-number generator with at minimum: `draw_exp(1)`,
//! `draw_uniform_01`, `draw_poisson(λ)`"). The default implementation
//! wraps `ChaCha12Rng`, matching the teacher's choice in `engine.rs`.

use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::{Distribution, Exp, Poisson};

/// Minimal random-number façade the kernel and external events share.
pub trait RngSource {
    /// Draw from `Exp(1)`, the internal mNRM clock target.
    fn draw_exp1(&mut self) -> f64;

    /// Draw uniformly from `[0, 1)`.
    fn draw_uniform_01(&mut self) -> f64;

    /// Draw from `Poisson(lambda)`.
    fn draw_poisson(&mut self, lambda: f64) -> u64;

    /// Draw a uniform integer in `[0, n)`. Used for random selection
    /// among agents (e.g. seeding, random partner choice) by concrete
    /// events, not by the kernel itself.
    fn draw_below(&mut self, n: usize) -> usize;

    /// Draw a boolean with probability `p` of being `true`.
    fn draw_bool(&mut self, p: f64) -> bool;
}

/// Default [`RngSource`], backed by a seedable, serializable ChaCha RNG.
pub struct ChaChaRng(ChaCha12Rng);

impl ChaChaRng {
    /// Seed from the OS entropy source.
    pub fn from_os_rng() -> Result<Self> {
        let rng = ChaCha12Rng::try_from_os_rng().context("failed to seed RNG from OS entropy")?;
        Ok(Self(rng))
    }

    /// Seed deterministically, for reproducible sequential runs.
    pub fn from_seed(seed: u64) -> Self {
        Self(ChaCha12Rng::seed_from_u64(seed))
    }
}

impl RngSource for ChaChaRng {
    fn draw_exp1(&mut self) -> f64 {
        Exp::new(1.0)
            .expect("Exp(1) is always a valid distribution")
            .sample(&mut self.0)
    }

    fn draw_uniform_01(&mut self) -> f64 {
        self.0.random_range(0.0..1.0)
    }

    fn draw_poisson(&mut self, lambda: f64) -> u64 {
        Poisson::new(lambda)
            .expect("lambda must be finite and positive")
            .sample(&mut self.0) as u64
    }

    fn draw_below(&mut self, n: usize) -> usize {
        self.0.random_range(0..n)
    }

    fn draw_bool(&mut self, p: f64) -> bool {
        self.0.random_bool(p)
    }
}
