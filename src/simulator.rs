use crate::error::{McviError, Result};
use rand::rngs::StdRng;

/// Opaque state identifier supplied by the simulator
pub type State = i64;

/// Opaque action identifier
pub type Action = i64;

/// Opaque observation identifier
pub type Observation = i64;

/// Outcome of a single simulator transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimStep {
    pub next_state: State,
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
}

/// Black-box POMDP simulator consumed by the planner.
///
/// The planner makes no assumption beyond these operations. Transition
/// randomness is the simulator's responsibility, drawn from the shared
/// generator handed in by the caller so that runs are reproducible under a
/// fixed seed.
pub trait Simulator {
    /// Number of discrete actions; actions are `0..num_actions`
    fn num_actions(&self) -> usize;

    /// Exclusive upper bound on observation identifiers
    fn num_observations(&self) -> usize;

    /// Discount factor γ in [0, 1)
    fn discount(&self) -> f64;

    /// Simulate one transition from `state` under `action`
    fn step(&self, state: State, action: Action, rng: &mut StdRng) -> SimStep;

    /// Draw one state from the start distribution
    fn sample_start(&self, rng: &mut StdRng) -> State;

    /// Whether `state` is terminal
    fn is_terminal(&self, state: State) -> bool;
}

/// Check a transition against the simulator contract.
///
/// Fail-fast per the planner's error model: a bad observation index or a
/// non-finite reward aborts planning rather than corrupting bounds.
pub fn validate_step(sim: &dyn Simulator, step: &SimStep) -> Result<()> {
    if !step.reward.is_finite() {
        return Err(McviError::simulator_violation(format!(
            "non-finite reward {}",
            step.reward
        )));
    }
    if step.observation < 0 || step.observation >= sim.num_observations() as i64 {
        return Err(McviError::simulator_violation(format!(
            "observation {} outside [0, {})",
            step.observation,
            sim.num_observations()
        )));
    }
    Ok(())
}

/// Check that `action` is within the simulator's action space
pub fn validate_action(sim: &dyn Simulator, action: Action) -> Result<()> {
    if action < 0 || action >= sim.num_actions() as i64 {
        return Err(McviError::InvalidAction {
            action,
            max_actions: sim.num_actions(),
        });
    }
    Ok(())
}

/// Greedy one-step-reward action at a concrete state.
///
/// Execution fallback for when the controller has no edge for an observed
/// symbol. Each action's instant reward is estimated from `probes` sampled
/// transitions and the action with the highest mean estimate wins, ties
/// going to the smallest action index.
pub fn greedy_one_step_action(
    sim: &dyn Simulator,
    state: State,
    probes: usize,
    rng: &mut StdRng,
) -> Result<Action> {
    if sim.num_actions() == 0 {
        return Err(McviError::invalid_parameter(
            "num_actions",
            "simulator exposes no actions",
        ));
    }
    let probes = probes.max(1);
    let mut best = (0, f64::NEG_INFINITY);
    for action in 0..sim.num_actions() as i64 {
        let mut sum = 0.0;
        for _ in 0..probes {
            let step = sim.step(state, action, rng);
            validate_step(sim, &step)?;
            sum += step.reward;
        }
        let mean = sum / probes as f64;
        if mean > best.1 {
            best = (action, mean);
        }
    }
    Ok(best.0)
}
