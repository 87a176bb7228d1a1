//! Weighted Random Selection
//!
//! Cumulative-weight selection over a fixed, ordered option list. The draw is
//! taken from `[0, total)` and the first option whose running total strictly
//! exceeds it wins, so every option owns a half-open slice of exactly
//! `weight` integers.

use crate::error::{Result, SimError};
use crate::rng::RandomSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightedOption<T> {
    pub value: T,
    pub weight: u32,
}

impl<T> WeightedOption<T> {
    pub fn new(value: T, weight: u32) -> Self {
        Self { value, weight }
    }
}

/// Discrete distribution over `T` proportional to option weights
#[derive(Debug, Clone)]
pub struct WeightedChoice<T> {
    options: Vec<WeightedOption<T>>,
    total: u64,
}

impl<T> WeightedChoice<T> {
    pub fn new(options: impl IntoIterator<Item = (T, u32)>) -> Result<Self> {
        let options: Vec<WeightedOption<T>> = options
            .into_iter()
            .map(|(value, weight)| WeightedOption::new(value, weight))
            .collect();
        if options.is_empty() {
            return Err(SimError::InvalidConfig(
                "weighted choice needs at least one option".to_string(),
            ));
        }
        if let Some(pos) = options.iter().position(|o| o.weight == 0) {
            return Err(SimError::InvalidConfig(format!(
                "weighted option #{} has zero weight",
                pos
            )));
        }
        let total = options.iter().map(|o| o.weight as u64).sum();
        Ok(Self { options, total })
    }

    pub fn pick<R: RandomSource>(&self, rng: &mut R) -> &T {
        if self.options.len() == 1 {
            return &self.options[0].value;
        }
        &self.options[self.index_for(rng.below(self.total))].value
    }

    /// Option index owning `draw`, for `draw` in `[0, total)`.
    fn index_for(&self, draw: u64) -> usize {
        let mut cumulative = 0u64;
        for (i, option) in self.options.iter().enumerate() {
            cumulative += option.weight as u64;
            if draw < cumulative {
                return i;
            }
        }
        self.options.len() - 1
    }

    pub fn total_weight(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn options(&self) -> &[WeightedOption<T>] {
        &self.options
    }
}
