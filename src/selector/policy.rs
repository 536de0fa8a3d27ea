//! Selection Strategy Table
//!
//! The task selector balances several objectives by drawing one of four
//! named strategies at random for every selection. The weights live in an
//! explicit table instead of literal probability thresholds, so tests can
//! pin a single strategy and deployments can retune the mix.

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Spread work: prefer tasks the fewest workers have exhausted.
    LeastCompletions,
    /// Cover the corpus: prefer tasks whose inputs are furthest from
    /// resolution.
    MostIncomplete,
    /// Close tasks out: prefer tasks that are nearly finished.
    MostComplete,
    /// Pick uniformly among the candidates.
    Uniform,
}

/// Weighted table of selection strategies.
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    weights: Vec<(SelectionStrategy, u32)>,
}

impl SelectionPolicy {
    pub fn new(weights: Vec<(SelectionStrategy, u32)>) -> Self {
        Self { weights }
    }

    /// A policy that always applies one strategy. Used by tests.
    pub fn single(strategy: SelectionStrategy) -> Self {
        Self {
            weights: vec![(strategy, 1)],
        }
    }

    /// Draws a strategy proportionally to its weight.
    pub fn pick<R: Rng>(&self, rng: &mut R) -> SelectionStrategy {
        let total: u32 = self.weights.iter().map(|(_, w)| w).sum();
        if total == 0 {
            return SelectionStrategy::Uniform;
        }
        let mut roll = rng.gen_range(0..total);
        for (strategy, weight) in &self.weights {
            if roll < *weight {
                return *strategy;
            }
            roll -= weight;
        }
        SelectionStrategy::Uniform
    }
}

impl Default for SelectionPolicy {
    /// Each strategy is applied a quarter of the time.
    fn default() -> Self {
        Self {
            weights: vec![
                (SelectionStrategy::LeastCompletions, 1),
                (SelectionStrategy::MostIncomplete, 1),
                (SelectionStrategy::MostComplete, 1),
                (SelectionStrategy::Uniform, 1),
            ],
        }
    }
}
