//! Random Draw Seam
//!
//! Every random decision in the engine goes through [`RandomSource`], so the
//! selectors and outcome classifiers can run against a seeded generator or a
//! fully scripted one.

use rand::{Rng, RngCore};
use std::collections::VecDeque;
use std::ops::RangeInclusive;

pub trait RandomSource: Send {
    /// Uniform integer in `[0, bound)`. Returns 0 when `bound` is 0.
    fn below(&mut self, bound: u64) -> u64;

    /// `true` with probability `p` (clamped to `[0, 1]`).
    fn chance(&mut self, p: f64) -> bool;

    /// Uniform float in `[0, 1)`.
    fn unit(&mut self) -> f64;

    fn fill_bytes(&mut self, dest: &mut [u8]);

    /// Uniform integer in `[low, high]`. The full `u64` span never yields
    /// `u64::MAX` itself.
    fn between(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        match (high - low).checked_add(1) {
            Some(span) => low + self.below(span),
            None => self.below(u64::MAX),
        }
    }

    fn draw(&mut self, range: &RangeInclusive<u64>) -> u64 {
        self.between(*range.start(), *range.end())
    }

    /// Uniformly chosen element, `None` for an empty slice.
    fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T>
    where
        Self: Sized,
    {
        if items.is_empty() {
            return None;
        }
        let idx = self.below(items.len() as u64) as usize;
        items.get(idx)
    }
}

impl<R: RngCore + Send> RandomSource for R {
    fn below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.random_range(0..bound)
    }

    fn chance(&mut self, p: f64) -> bool {
        self.random_bool(p.clamp(0.0, 1.0))
    }

    fn unit(&mut self) -> f64 {
        self.random::<f64>()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        RngCore::fill_bytes(self, dest)
    }
}

/// Deterministic source with scripted answers.
///
/// `below` pops queued values (reduced modulo the bound) and falls back to 0,
/// which always selects the first weighted option and the lowest latency.
/// `chance(p)` answers `p >= threshold`; the default threshold rejects every
/// roll. Bytes come from a counter so generated ids stay unique.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    draws: VecDeque<u64>,
    chance_threshold: f64,
    counter: u64,
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self {
            draws: VecDeque::new(),
            chance_threshold: f64::INFINITY,
            counter: 0,
        }
    }
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_draws(mut self, draws: impl IntoIterator<Item = u64>) -> Self {
        self.draws.extend(draws);
        self
    }

    /// Accept every `chance(p)` roll with `p >= threshold`.
    pub fn accept_chances_from(mut self, threshold: f64) -> Self {
        self.chance_threshold = threshold;
        self
    }
}

impl RandomSource for ScriptedSource {
    fn below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.draws.pop_front().unwrap_or(0) % bound
    }

    fn chance(&mut self, p: f64) -> bool {
        p >= self.chance_threshold
    }

    fn unit(&mut self) -> f64 {
        0.0
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.counter += 1;
        for (i, byte) in dest.iter_mut().enumerate() {
            let shift = (i % 8) * 8;
            *byte = (self.counter >> shift) as u8 ^ (i as u8).wrapping_mul(31);
        }
    }
}
