//! # Bound Estimators
//!
//! Admissible value bounds on beliefs: a safe floor derived from worst-case
//! instant rewards ([`find_r_lower`]) and a heuristic ceiling supplied by a
//! [`BoundHeuristic`] collaborator. Both are evaluated only when a belief
//! tree node is first created; the planner caches the floor computed at the
//! initial belief and reuses it everywhere else.

use crate::belief::Belief;
use crate::error::{McviError, Result};
use crate::simulator::{validate_step, Action, Simulator, State};
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap};

/// Sampled transitions per (state, action) when probing instant rewards
const REWARD_PROBES: usize = 4;

/// Safe lower bound on the value of `belief`.
///
/// Picks the action maximising the worst sampled instant reward over the
/// belief support, then propagates that reward geometrically. A negative
/// floor propagates by the full `r / (1 - γ)` sum; a positive one is only
/// propagated while no probe terminated (an episodic problem cannot promise
/// the reward repeats) and the series is truncated at `eval_depth` or once
/// the increment drops below `eval_epsilon`.
pub fn find_r_lower(
    sim: &dyn Simulator,
    belief: &Belief,
    eval_depth: usize,
    eval_epsilon: f64,
    rng: &mut StdRng,
) -> Result<f64> {
    belief.validate()?;
    let gamma = sim.discount();

    let mut best: Option<(f64, bool)> = None;
    for action in 0..sim.num_actions() as Action {
        let mut worst = f64::INFINITY;
        let mut saw_done = false;
        for state in belief.support() {
            for _ in 0..REWARD_PROBES {
                let step = sim.step(state, action, rng);
                validate_step(sim, &step)?;
                worst = worst.min(step.reward);
                saw_done |= step.done;
            }
        }
        let better = match best {
            None => true,
            Some((r, _)) => worst > r,
        };
        if better {
            best = Some((worst, saw_done));
        }
    }

    let (reward, saw_done) = best.ok_or_else(|| {
        McviError::invalid_parameter("num_actions", "simulator exposes no actions")
    })?;

    if reward >= 0.0 {
        if saw_done {
            // termination means the reward is only guaranteed once
            return Ok(reward);
        }
        let mut value = 0.0;
        let mut term = reward;
        for _ in 0..eval_depth {
            if term.abs() < eval_epsilon {
                break;
            }
            value += term;
            term *= gamma;
        }
        Ok(value)
    } else {
        Ok(reward / (1.0 - gamma))
    }
}

/// External upper-bound collaborator.
///
/// Returns an admissible ceiling on the value achievable from `state`
/// within `depth` steps together with the greedy action attaining it.
/// Implementations may memoise; the planner calls this once per state in a
/// freshly created node's belief support.
pub trait BoundHeuristic {
    fn evaluate(
        &mut self,
        sim: &dyn Simulator,
        state: State,
        depth: usize,
        rng: &mut StdRng,
    ) -> (Action, f64);
}

/// Admissible upper bound on a belief with the greedy action attaining it.
///
/// The ceiling is the probability-weighted sum of per-state heuristic
/// values; the action is the probability-weighted majority of per-state
/// greedy actions, ties to the smallest index.
pub fn upper_bound_evaluation(
    belief: &Belief,
    sim: &dyn Simulator,
    heuristic: &mut dyn BoundHeuristic,
    eval_depth: usize,
    rng: &mut StdRng,
) -> Result<(Action, f64)> {
    belief.validate()?;
    let mut value = 0.0;
    let mut votes: BTreeMap<Action, f64> = BTreeMap::new();
    for (state, p) in belief.iter() {
        let (action, v) = heuristic.evaluate(sim, state, eval_depth, rng);
        if !v.is_finite() {
            return Err(McviError::NumericalError(format!(
                "heuristic returned non-finite bound {} at state {}",
                v, state
            )));
        }
        value += p * v;
        *votes.entry(action).or_insert(0.0) += p;
    }
    let mut best = (0, f64::NEG_INFINITY);
    for (&action, &weight) in &votes {
        if weight > best.1 {
            best = (action, weight);
        }
    }
    Ok((best.0, value))
}

/// Sampled full-observability relaxation used as the default ceiling.
///
/// Depth-limited optimistic value iteration through the black-box
/// simulator: `v_d(s) = max_a max_probe [r + γ v_{d-1}(s')]`. Assuming the
/// latent state is visible can only overestimate the POMDP value, so the
/// estimate is admissible. Results are memoised per (state, remaining
/// depth).
pub struct MdpRolloutBound {
    probes: usize,
    cache: HashMap<(State, usize), (Action, f64)>,
}

impl MdpRolloutBound {
    pub fn new() -> Self {
        MdpRolloutBound {
            probes: 3,
            cache: HashMap::new(),
        }
    }

    /// Override the number of sampled transitions per (state, action)
    pub fn with_probes(probes: usize) -> Self {
        MdpRolloutBound {
            probes: probes.max(1),
            cache: HashMap::new(),
        }
    }

    /// Number of memoised (state, depth) entries
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for MdpRolloutBound {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundHeuristic for MdpRolloutBound {
    fn evaluate(
        &mut self,
        sim: &dyn Simulator,
        state: State,
        depth: usize,
        rng: &mut StdRng,
    ) -> (Action, f64) {
        if depth == 0 || sim.is_terminal(state) {
            return (0, 0.0);
        }
        if let Some(&hit) = self.cache.get(&(state, depth)) {
            return hit;
        }
        let gamma = sim.discount();
        let mut best = (0, f64::NEG_INFINITY);
        for action in 0..sim.num_actions() as Action {
            let mut q = f64::NEG_INFINITY;
            for _ in 0..self.probes {
                let step = sim.step(state, action, rng);
                let v = if step.done {
                    step.reward
                } else {
                    step.reward + gamma * self.evaluate(sim, step.next_state, depth - 1, rng).1
                };
                q = q.max(v);
            }
            if q > best.1 {
                best = (action, q);
            }
        }
        self.cache.insert((state, depth), best);
        best
    }
}
