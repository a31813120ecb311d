//! # Belief Distributions
//!
//! A belief is a probability distribution over the hidden states of a POMDP.
//! The planner represents beliefs sparsely: only states with strictly
//! positive probability are stored, and the weights always sum to one.
//!
//! Sampling routines take the shared random generator by mutable reference
//! so that planning runs are reproducible under a fixed seed.

use crate::error::{McviError, Result};
use crate::simulator::{Simulator, State};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tolerance for normalisation checks
pub const NORMALISATION_TOLERANCE: f64 = 1e-9;

/// Sparse probability distribution over states.
///
/// Invariants: non-empty, all weights strictly positive and finite, weights
/// sum to 1 within [`NORMALISATION_TOLERANCE`]. The backing map is ordered
/// so that iteration (and therefore inverse-CDF sampling) is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    weights: BTreeMap<State, f64>,
}

impl Belief {
    /// Build a belief from raw non-negative weights, dropping zero entries
    /// and normalising the rest.
    pub fn from_weights(raw: BTreeMap<State, f64>) -> Result<Self> {
        let mut weights = BTreeMap::new();
        let mut total = 0.0;
        for (state, w) in raw {
            if !w.is_finite() || w < 0.0 {
                return Err(McviError::NumericalError(format!(
                    "belief weight {} for state {} is not a finite non-negative value",
                    w, state
                )));
            }
            if w > 0.0 {
                total += w;
                weights.insert(state, w);
            }
        }
        if weights.is_empty() || total <= 0.0 {
            return Err(McviError::EmptyBelief(
                "belief has no positive-weight states".to_string(),
            ));
        }
        for w in weights.values_mut() {
            *w /= total;
        }
        Ok(Belief { weights })
    }

    /// Belief concentrated on a single state
    pub fn singleton(state: State) -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(state, 1.0);
        Belief { weights }
    }

    /// Estimate the initial belief by drawing `n` start states from the
    /// simulator and counting frequencies.
    pub fn sample_initial(sim: &dyn Simulator, n: usize, rng: &mut StdRng) -> Result<Self> {
        if n == 0 {
            return Err(McviError::invalid_parameter(
                "n",
                "initial belief needs at least one sample",
            ));
        }
        let mut counts: BTreeMap<State, f64> = BTreeMap::new();
        for _ in 0..n {
            *counts.entry(sim.sample_start(rng)).or_insert(0.0) += 1.0;
        }
        Belief::from_weights(counts)
    }

    /// Probability of `state`, zero if absent
    pub fn prob(&self, state: State) -> f64 {
        self.weights.get(&state).copied().unwrap_or(0.0)
    }

    /// Number of states with positive probability
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Iterate over (state, probability) pairs in state order
    pub fn iter(&self) -> impl Iterator<Item = (State, f64)> + '_ {
        self.weights.iter().map(|(&s, &p)| (s, p))
    }

    /// States with positive probability
    pub fn support(&self) -> impl Iterator<Item = State> + '_ {
        self.weights.keys().copied()
    }

    /// Sum of stored weights (1 up to rounding)
    pub fn total_mass(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Check the belief invariants, surfacing violations as errors
    pub fn validate(&self) -> Result<()> {
        if self.weights.is_empty() {
            return Err(McviError::EmptyBelief("belief has no states".to_string()));
        }
        let total = self.total_mass();
        if (total - 1.0).abs() > NORMALISATION_TOLERANCE {
            return Err(McviError::NumericalError(format!(
                "belief mass {} deviates from 1",
                total
            )));
        }
        Ok(())
    }

    /// Inverse-CDF draw of a single state
    pub fn sample_one(&self, rng: &mut StdRng) -> State {
        let u: f64 = rng.gen::<f64>() * self.total_mass();
        let mut acc = 0.0;
        let mut last = 0;
        for (&state, &w) in &self.weights {
            acc += w;
            last = state;
            if u < acc {
                return state;
            }
        }
        // rounding can push u past the accumulated mass
        last
    }

    /// Weighted reservoir down-sample (Efraimidis-Spirakis) of up to `k`
    /// distinct states, renormalised.
    ///
    /// Bernoulli thinning would bias toward low-weight states at small `k`;
    /// the reservoir keys `u^(1/w)` keep inclusion probability proportional
    /// to weight.
    pub fn down_sample(&self, k: usize, rng: &mut StdRng) -> Result<Self> {
        if k == 0 {
            return Err(McviError::invalid_parameter(
                "k",
                "down-sample size must be positive",
            ));
        }
        if self.weights.len() <= k {
            return Ok(self.clone());
        }
        let mut keyed: Vec<(f64, State, f64)> = self
            .weights
            .iter()
            .map(|(&s, &w)| {
                let u: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
                (u.powf(1.0 / w), s, w)
            })
            .collect();
        keyed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let kept: BTreeMap<State, f64> = keyed.into_iter().take(k).map(|(_, s, w)| (s, w)).collect();
        Belief::from_weights(kept)
    }

    /// Start a destructive without-replacement draw over this belief
    pub fn to_draw(&self) -> WeightedDraw {
        WeightedDraw {
            remaining: self.weights.clone(),
        }
    }
}

impl fmt::Display for Belief {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (&s, &p)) in self.weights.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:.6}", s, p)?;
        }
        write!(f, "}}")
    }
}

/// Destructive weighted sampler used by AND-node belief updates.
///
/// Each draw removes the chosen state, so a belief of `n` states yields at
/// most `n` draws, each returned with its original probability.
pub struct WeightedDraw {
    remaining: BTreeMap<State, f64>,
}

impl WeightedDraw {
    /// Draw one state proportional to the remaining weights, or `None`
    /// when the support is exhausted.
    pub fn draw(&mut self, rng: &mut StdRng) -> Option<(State, f64)> {
        if self.remaining.is_empty() {
            return None;
        }
        let total: f64 = self.remaining.values().sum();
        if total <= 0.0 {
            return None;
        }
        let u: f64 = rng.gen::<f64>() * total;
        let mut acc = 0.0;
        let mut chosen = *self.remaining.keys().next_back().unwrap();
        for (&state, &w) in &self.remaining {
            acc += w;
            if u < acc {
                chosen = state;
                break;
            }
        }
        let p = self.remaining.remove(&chosen).unwrap();
        Some((chosen, p))
    }

    /// States not yet drawn
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}
