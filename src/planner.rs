//! # Planner Driver
//!
//! Iterates the two-pass MCVI loop until the root bound gap closes: a
//! forward sample-down pass discovers and bounds new belief nodes along the
//! most informative observation branch, then backups replay over that path
//! in reverse so freshly minted controller indices propagate from the
//! leaves toward the root. Planning stops at convergence (`epsilon`), the
//! iteration cap or the wall-clock budget; budget exhaustion is not an
//! error, the best controller so far is kept.

use crate::backup::{back_up, BackupParams};
use crate::belief::Belief;
use crate::bounds::{find_r_lower, BoundHeuristic};
use crate::error::{McviError, Result};
use crate::fsc::{Fsc, FscNode};
use crate::metrics::{EvaluationStats, PlanningMetrics, RunningStats};
use crate::simulator::{
    greedy_one_step_action, validate_step, Action, Observation, Simulator, State,
};
use crate::tree::{BeliefTree, NodeId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Sampled transitions per action when the execution fallback estimates
/// one-step rewards
const GREEDY_FALLBACK_PROBES: usize = 4;

/// Caller-supplied planning options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Depth bound for controller rollouts and the forward traversal
    pub max_depth_sim: usize,

    /// Convergence threshold on the root bound gap
    pub epsilon: f64,

    /// Hard cap on outer iterations
    pub max_iter: usize,

    /// Wall-clock budget, checked at the top of each iteration
    pub max_computation_ms: u64,

    /// Depth bound for the bound estimators
    pub eval_depth: usize,

    /// Tolerance fed to the bound estimators
    pub eval_epsilon: f64,

    /// Cap on particles drawn in AND-node belief updates
    pub max_belief_samples: usize,

    /// Reservation hint for the controller store
    pub max_node_size: usize,

    /// Attach controller nodes even when the backup produced no outgoing
    /// edges. Off by default, which keeps non-terminal beliefs from
    /// pointing at edgeless nodes; turn it on for episodic problems where
    /// the optimal action jumps straight to a terminal belief.
    pub attach_edgeless_nodes: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            max_depth_sim: 30,
            epsilon: 0.01,
            max_iter: 100,
            max_computation_ms: 10_000,
            eval_depth: 50,
            eval_epsilon: 0.005,
            max_belief_samples: 100,
            max_node_size: 10_000,
            attach_edgeless_nodes: false,
        }
    }
}

impl PlannerConfig {
    pub fn builder() -> PlannerConfigBuilder {
        PlannerConfigBuilder::new()
    }
}

/// Builder pattern for [`PlannerConfig`]
pub struct PlannerConfigBuilder {
    config: PlannerConfig,
}

impl PlannerConfigBuilder {
    pub fn new() -> Self {
        PlannerConfigBuilder {
            config: PlannerConfig::default(),
        }
    }

    pub fn max_depth_sim(mut self, depth: usize) -> Self {
        self.config.max_depth_sim = depth;
        self
    }

    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.config.epsilon = epsilon;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter;
        self
    }

    pub fn max_computation_ms(mut self, budget: u64) -> Self {
        self.config.max_computation_ms = budget;
        self
    }

    pub fn eval_depth(mut self, depth: usize) -> Self {
        self.config.eval_depth = depth;
        self
    }

    pub fn eval_epsilon(mut self, epsilon: f64) -> Self {
        self.config.eval_epsilon = epsilon;
        self
    }

    pub fn max_belief_samples(mut self, samples: usize) -> Self {
        self.config.max_belief_samples = samples;
        self
    }

    pub fn max_node_size(mut self, size: usize) -> Self {
        self.config.max_node_size = size;
        self
    }

    pub fn attach_edgeless_nodes(mut self, attach: bool) -> Self {
        self.config.attach_edgeless_nodes = attach;
        self
    }

    /// Validate and produce the configuration
    pub fn build(self) -> Result<PlannerConfig> {
        let c = &self.config;
        if c.epsilon.is_nan() {
            return Err(McviError::invalid_parameter("epsilon", "must not be NaN"));
        }
        if !c.eval_epsilon.is_finite() || c.eval_epsilon <= 0.0 {
            return Err(McviError::invalid_parameter(
                "eval_epsilon",
                "must be a positive finite tolerance",
            ));
        }
        if c.max_depth_sim == 0 {
            return Err(McviError::invalid_parameter(
                "max_depth_sim",
                "must be at least 1",
            ));
        }
        if c.max_belief_samples == 0 {
            return Err(McviError::invalid_parameter(
                "max_belief_samples",
                "must be at least 1",
            ));
        }
        Ok(self.config)
    }
}

impl Default for PlannerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a planning run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Completed outer iterations
    pub iterations: usize,

    /// Whether the root gap closed below `epsilon`
    pub converged: bool,

    /// Final root upper bound
    pub upper_bound: f64,

    /// Final root lower bound
    pub lower_bound: f64,
}

/// One executed step of a controller-guided trajectory
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub state: State,
    pub action: Action,
    pub observation: Observation,
    pub reward: f64,
}

/// A controller-guided trajectory with its discounted return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationTrace {
    pub steps: Vec<TraceStep>,
    pub discounted_reward: f64,
}

/// Monte-Carlo Value Iteration planner.
///
/// Owns the simulator, the bound heuristic, the belief tree, the growing
/// controller and a seeded random generator; a fixed seed and a
/// deterministic simulator reproduce the same controller.
pub struct McviPlanner<S: Simulator, H: BoundHeuristic> {
    sim: S,
    heuristic: H,
    config: PlannerConfig,
    rng: StdRng,
    tree: BeliefTree,
    fsc: Fsc,
    root: NodeId,
    r_lower: f64,
    metrics: PlanningMetrics,
}

impl<S: Simulator, H: BoundHeuristic> McviPlanner<S, H> {
    /// Create a planner for `initial_belief`.
    ///
    /// Computes and caches the `R_lower` floor from the initial belief,
    /// creates the root node and seeds the controller with a single
    /// uniformly-random-action node; the first backup at the root
    /// overwrites or deduplicates that bootstrap.
    pub fn new(
        sim: S,
        mut heuristic: H,
        initial_belief: Belief,
        config: PlannerConfig,
        seed: u64,
    ) -> Result<Self> {
        let gamma = sim.discount();
        if !(0.0..1.0).contains(&gamma) {
            return Err(McviError::simulator_violation(format!(
                "discount {} outside [0, 1)",
                gamma
            )));
        }
        if sim.num_actions() == 0 {
            return Err(McviError::invalid_parameter(
                "num_actions",
                "simulator exposes no actions",
            ));
        }
        initial_belief.validate()?;

        let mut rng = StdRng::seed_from_u64(seed);
        let initial_belief = if initial_belief.len() > config.max_belief_samples {
            initial_belief.down_sample(config.max_belief_samples, &mut rng)?
        } else {
            initial_belief
        };
        let r_lower = find_r_lower(
            &sim,
            &initial_belief,
            config.eval_depth,
            config.eval_epsilon,
            &mut rng,
        )?;

        let mut tree = BeliefTree::new();
        let root = tree.create_node(
            initial_belief,
            &sim,
            &mut heuristic,
            config.eval_depth,
            r_lower,
            &mut rng,
        )?;

        let mut fsc = Fsc::with_capacity(config.max_node_size);
        let bootstrap = rng.gen_range(0..sim.num_actions()) as Action;
        let start = fsc.add_node(FscNode::new(bootstrap));
        fsc.set_start(start);
        tree.node_mut(root).set_fsc_node(Some(start));

        Ok(McviPlanner {
            sim,
            heuristic,
            config,
            rng,
            tree,
            fsc,
            root,
            r_lower,
            metrics: PlanningMetrics::default(),
        })
    }

    /// Run the planning loop until the root gap is below `epsilon`, the
    /// iteration cap is hit or the wall-clock budget runs out.
    pub fn plan(&mut self) -> Result<PlanSummary> {
        let started = Instant::now();
        let mut iterations = 0;

        for _ in 0..self.config.max_iter {
            if started.elapsed().as_millis() as u64 >= self.config.max_computation_ms {
                break;
            }
            let gap = self.tree.node(self.root).gap();
            if gap.abs() < self.config.epsilon {
                break;
            }

            let mut traversal = Vec::new();
            self.sample_down(gap, &mut traversal)?;
            while let Some(id) = traversal.pop() {
                self.back_up_node(id)?;
            }
            if let Some(index) = self.tree.node(self.root).fsc_node() {
                self.fsc.set_start(index);
            }

            iterations += 1;
            let root = self.tree.node(self.root);
            self.metrics
                .record_iteration(root.upper(), root.lower(), self.fsc.num_nodes());
        }

        let root = self.tree.node(self.root);
        Ok(PlanSummary {
            iterations,
            converged: root.gap().abs() < self.config.epsilon,
            upper_bound: root.upper(),
            lower_bound: root.lower(),
        })
    }

    /// Forward pass: back up nodes along the most informative observation
    /// branch, recording the path for the reverse pass. `target` is the
    /// root gap at the start of the iteration.
    fn sample_down(&mut self, target: f64, out: &mut Vec<NodeId>) -> Result<()> {
        let mut current = self.root;
        let mut depth = 0;
        while depth < self.config.max_depth_sim {
            self.back_up_node(current)?;
            out.push(current);
            match self.tree.choose_observation(current, target) {
                Some(next) => {
                    current = next;
                    depth += 1;
                }
                None => break,
            }
        }
        Ok(())
    }

    fn back_up_node(&mut self, id: NodeId) -> Result<()> {
        let params = BackupParams {
            max_belief_samples: self.config.max_belief_samples,
            max_depth_sim: self.config.max_depth_sim,
            eval_depth: self.config.eval_depth,
            attach_edgeless_nodes: self.config.attach_edgeless_nodes,
        };
        let McviPlanner {
            sim,
            heuristic,
            tree,
            fsc,
            rng,
            r_lower,
            ..
        } = self;
        back_up(tree, id, fsc, &*sim, &mut *heuristic, params, *r_lower, rng)
    }

    /// Walk the controller from its start node on one sampled trajectory.
    ///
    /// When an observation has no outgoing edge the controller pointer is
    /// lost and every later action falls back to the greedy one-step-reward
    /// choice.
    pub fn simulate_with_fsc(&mut self, steps: usize) -> Result<SimulationTrace> {
        let start_state = self.sim.sample_start(&mut self.rng);
        let (steps, discounted_reward) = self.rollout(start_state, steps)?;
        Ok(SimulationTrace {
            steps,
            discounted_reward,
        })
    }

    /// Welford statistics of the discounted return over `num_sims`
    /// independent controller-guided simulations, starting from a fresh
    /// initial belief estimated with `init_belief_samples` draws.
    pub fn evaluate_with_fsc(
        &mut self,
        max_steps: usize,
        num_sims: usize,
        init_belief_samples: usize,
    ) -> Result<EvaluationStats> {
        let init = Belief::sample_initial(&self.sim, init_belief_samples, &mut self.rng)?;
        let mut stats = RunningStats::new();
        for _ in 0..num_sims {
            let start_state = init.sample_one(&mut self.rng);
            let (_, reward) = self.rollout(start_state, max_steps)?;
            stats.update(reward);
        }
        Ok(stats.to_stats())
    }

    fn rollout(&mut self, start_state: State, max_steps: usize) -> Result<(Vec<TraceStep>, f64)> {
        let gamma = self.sim.discount();
        let mut state = start_state;
        let mut node = self.fsc.start();
        let mut steps = Vec::new();
        let mut total = 0.0;
        for t in 0..max_steps {
            if self.sim.is_terminal(state) {
                break;
            }
            let action = match node {
                Some(i) => self.fsc.node(i).best_action(),
                None => greedy_one_step_action(
                    &self.sim,
                    state,
                    GREEDY_FALLBACK_PROBES,
                    &mut self.rng,
                )?,
            };
            let outcome = self.sim.step(state, action, &mut self.rng);
            validate_step(&self.sim, &outcome)?;
            total += gamma.powi(t as i32) * outcome.reward;
            steps.push(TraceStep {
                state,
                action,
                observation: outcome.observation,
                reward: outcome.reward,
            });
            node = node.and_then(|i| self.fsc.edge(i, outcome.observation));
            if outcome.done {
                break;
            }
            state = outcome.next_state;
        }
        Ok((steps, total))
    }

    /// The controller built so far
    pub fn fsc(&self) -> &Fsc {
        &self.fsc
    }

    /// Consume the planner and keep only the controller
    pub fn into_fsc(self) -> Fsc {
        self.fsc
    }

    /// The belief tree (root at [`McviPlanner::root`])
    pub fn tree(&self) -> &BeliefTree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Current root bounds as `(lower, upper)`
    pub fn root_bounds(&self) -> (f64, f64) {
        let root = self.tree.node(self.root);
        (root.lower(), root.upper())
    }

    /// The cached `R_lower` floor computed from the initial belief
    pub fn r_lower(&self) -> f64 {
        self.r_lower
    }

    /// Per-iteration planning history
    pub fn metrics(&self) -> &PlanningMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Adjust planning options between [`McviPlanner::plan`] calls, e.g.
    /// to grant more iterations after inspecting the bounds
    pub fn config_mut(&mut self) -> &mut PlannerConfig {
        &mut self.config
    }
}
