//! # Belief Expansion Tree
//!
//! AND/OR search tree over beliefs. OR-nodes carry a belief with upper and
//! lower value bounds; AND-nodes expand one action into observation-weighted
//! child beliefs. The tree is an arena of OR-nodes addressed by dense
//! [`NodeId`] indices, which sidesteps reference cycles and keeps child
//! sharing cheap.
//!
//! Expansion is steered by bound gaps: [`BeliefTree::choose_observation`]
//! walks toward the observation branch whose weighted gap exceeds the
//! current root gap, and ends the traversal when no such branch exists.

use crate::belief::Belief;
use crate::bounds::{upper_bound_evaluation, BoundHeuristic};
use crate::error::{McviError, Result};
use crate::fsc::Fsc;
use crate::simulator::{validate_action, validate_step, Action, Observation, Simulator, State};
use rand::rngs::StdRng;
use std::collections::BTreeMap;

/// Index of an OR-node in the tree arena
pub type NodeId = usize;

/// AND-node: the expansion of one action at a parent belief
#[derive(Debug, Clone)]
pub struct ActionNode {
    observation_weights: BTreeMap<Observation, f64>,
    observation_children: BTreeMap<Observation, NodeId>,
    expected_reward: f64,
    expected_upper: f64,
    expected_lower: f64,
}

impl ActionNode {
    /// Observation likelihoods under the parent belief and this action
    pub fn observation_weights(&self) -> &BTreeMap<Observation, f64> {
        &self.observation_weights
    }

    /// Child OR-node per observation
    pub fn observation_children(&self) -> &BTreeMap<Observation, NodeId> {
        &self.observation_children
    }

    /// E[r | b, a]
    pub fn expected_reward(&self) -> f64 {
        self.expected_reward
    }

    /// Σ w(o) · child.upper
    pub fn expected_upper(&self) -> f64 {
        self.expected_upper
    }

    /// Σ w(o) · child.lower
    pub fn expected_lower(&self) -> f64 {
        self.expected_lower
    }
}

/// OR-node: a belief with value bounds, per-action children and the link
/// to the controller node currently representing it
#[derive(Debug, Clone)]
pub struct OrNode {
    belief: Belief,
    upper: f64,
    lower: f64,
    best_action_upper: Action,
    best_action_lower: Action,
    fsc_node: Option<usize>,
    children: BTreeMap<Action, ActionNode>,
}

impl OrNode {
    pub fn belief(&self) -> &Belief {
        &self.belief
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// Current bound gap `upper - lower`
    pub fn gap(&self) -> f64 {
        self.upper - self.lower
    }

    /// Action with the largest expected upper bound (drives exploration)
    pub fn best_action_upper(&self) -> Action {
        self.best_action_upper
    }

    /// Action with the largest expected lower bound (drives the policy)
    pub fn best_action_lower(&self) -> Action {
        self.best_action_lower
    }

    /// Index of the attached controller node, if any
    pub fn fsc_node(&self) -> Option<usize> {
        self.fsc_node
    }

    pub fn set_fsc_node(&mut self, index: Option<usize>) {
        self.fsc_node = index;
    }

    /// The AND-node for `action`, if expanded
    pub fn action_node(&self, action: Action) -> Option<&ActionNode> {
        self.children.get(&action)
    }

    /// Actions expanded so far, in ascending order
    pub fn expanded_actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.children.keys().copied()
    }

    pub fn num_expanded(&self) -> usize {
        self.children.len()
    }
}

/// Arena of OR-nodes with a shared root at index 0
#[derive(Debug, Clone, Default)]
pub struct BeliefTree {
    nodes: Vec<OrNode>,
}

impl BeliefTree {
    pub fn new() -> Self {
        BeliefTree::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &OrNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut OrNode {
        &mut self.nodes[id]
    }

    /// Create an OR-node for `belief`, initialising its bounds: the upper
    /// bound and exploration action come from the heuristic, the lower
    /// bound is the planner's cached floor clamped to the ceiling. A belief
    /// supported entirely by terminal states is worth exactly zero, so both
    /// bounds collapse there without consulting the estimators.
    pub fn create_node(
        &mut self,
        belief: Belief,
        sim: &dyn Simulator,
        heuristic: &mut dyn BoundHeuristic,
        eval_depth: usize,
        r_lower_floor: f64,
        rng: &mut StdRng,
    ) -> Result<NodeId> {
        belief.validate()?;
        if !r_lower_floor.is_finite() {
            return Err(McviError::NumericalError(format!(
                "lower bound floor {} is not finite",
                r_lower_floor
            )));
        }
        let all_terminal = belief.support().all(|s| sim.is_terminal(s));
        let (best_action, upper, lower) = if all_terminal {
            (0, 0.0, 0.0)
        } else {
            let (best_action, upper) =
                upper_bound_evaluation(&belief, sim, heuristic, eval_depth, rng)?;
            (best_action, upper, r_lower_floor.min(upper))
        };
        self.nodes.push(OrNode {
            belief,
            upper,
            lower,
            best_action_upper: best_action,
            best_action_lower: best_action,
            fsc_node: None,
            children: BTreeMap::new(),
        });
        Ok(self.nodes.len() - 1)
    }

    /// Ensure the AND-node for `action` exists at `id`, building it from
    /// the simulator.
    ///
    /// Up to `max_belief_samples` states are drawn from the parent belief
    /// without replacement; each drawn `(s, p)` contributes one simulator
    /// transition to the intermediate `next[o][s'] += p` table and to the
    /// expected reward. Child beliefs are the renormalised per-observation
    /// slices and observation weights their relative masses.
    ///
    /// Fresh children with at least one non-terminal state in their
    /// support are attached to `bootstrap_index` (the controller's current
    /// start node): unvisited frontier beliefs then have a default
    /// continuation policy whose value the backup can estimate by rollout,
    /// and the first backup of each node replaces the bootstrap link.
    /// Fully terminal children stay unattached.
    #[allow(clippy::too_many_arguments)]
    pub fn expand_action(
        &mut self,
        id: NodeId,
        action: Action,
        sim: &dyn Simulator,
        heuristic: &mut dyn BoundHeuristic,
        max_belief_samples: usize,
        eval_depth: usize,
        r_lower_floor: f64,
        bootstrap_index: Option<usize>,
        rng: &mut StdRng,
    ) -> Result<()> {
        validate_action(sim, action)?;
        if self.nodes[id].children.contains_key(&action) {
            return Ok(());
        }

        let mut draw = self.nodes[id].belief.to_draw();
        let mut next: BTreeMap<Observation, BTreeMap<State, f64>> = BTreeMap::new();
        let mut reward_sum = 0.0;
        let mut mass = 0.0;
        for _ in 0..max_belief_samples {
            let Some((state, p)) = draw.draw(rng) else {
                break;
            };
            let outcome = sim.step(state, action, rng);
            validate_step(sim, &outcome)?;
            mass += p;
            reward_sum += p * outcome.reward;
            *next
                .entry(outcome.observation)
                .or_default()
                .entry(outcome.next_state)
                .or_insert(0.0) += p;
        }
        if mass <= 0.0 {
            return Err(McviError::NumericalError(
                "belief update drew no probability mass".to_string(),
            ));
        }

        let mut observation_weights = BTreeMap::new();
        let mut observation_children = BTreeMap::new();
        let mut expected_upper = 0.0;
        let mut expected_lower = 0.0;
        for (obs, states) in next {
            let obs_mass: f64 = states.values().sum();
            let weight = obs_mass / mass;
            let child_belief = Belief::from_weights(states)?;
            let child =
                self.create_node(child_belief, sim, heuristic, eval_depth, r_lower_floor, rng)?;
            let nonterminal = self.nodes[child]
                .belief
                .support()
                .any(|s| !sim.is_terminal(s));
            if nonterminal {
                self.nodes[child].fsc_node = bootstrap_index;
            }
            expected_upper += weight * self.nodes[child].upper;
            expected_lower += weight * self.nodes[child].lower;
            observation_weights.insert(obs, weight);
            observation_children.insert(obs, child);
        }

        self.nodes[id].children.insert(
            action,
            ActionNode {
                observation_weights,
                observation_children,
                expected_reward: reward_sum / mass,
                expected_upper,
                expected_lower,
            },
        );
        Ok(())
    }

    /// Recompute the expected bounds of every expanded action at `id` and
    /// re-pick the best actions.
    ///
    /// A child that carries a controller node contributes the
    /// belief-weighted memoised rollout value of that node when it improves
    /// on the child's stored lower bound; this is how Monte-Carlo value
    /// estimates of the current controller flow back into action choice.
    /// Node bounds only tighten: the upper bound never increases (and is
    /// only updated once all actions are expanded), the lower bound never
    /// decreases.
    pub fn back_up_actions(
        &mut self,
        id: NodeId,
        fsc: &mut Fsc,
        r_lower: f64,
        sim_depth: usize,
        sim: &dyn Simulator,
        rng: &mut StdRng,
    ) -> Result<()> {
        let gamma = sim.discount();
        let actions: Vec<Action> = self.nodes[id].children.keys().copied().collect();
        if actions.is_empty() {
            return Ok(());
        }

        let mut best_upper: Option<(Action, f64)> = None;
        let mut best_lower: Option<(Action, f64)> = None;
        for action in actions {
            let and = &self.nodes[id].children[&action];
            let expected_reward = and.expected_reward;
            let entries: Vec<(f64, NodeId)> = and
                .observation_weights
                .iter()
                .map(|(obs, &w)| (w, and.observation_children[obs]))
                .collect();

            let mut e_upper = 0.0;
            let mut e_lower = 0.0;
            for (weight, child_id) in entries {
                let child_upper = self.nodes[child_id].upper;
                let mut child_lower = self.nodes[child_id].lower;
                if let Some(fsc_idx) = self.nodes[child_id].fsc_node {
                    let pairs: Vec<(State, f64)> = self.nodes[child_id].belief.iter().collect();
                    let mut simulated = 0.0;
                    for (state, p) in pairs {
                        simulated += p * fsc.node_value(fsc_idx, state, r_lower, sim_depth, sim, rng);
                    }
                    if simulated > child_lower {
                        child_lower = simulated.min(child_upper);
                        self.nodes[child_id].lower = child_lower;
                    }
                }
                e_upper += weight * child_upper;
                e_lower += weight * child_lower;
            }

            let and = self.nodes[id].children.get_mut(&action).unwrap();
            and.expected_upper = e_upper;
            and.expected_lower = e_lower;
            let q_upper = expected_reward + gamma * e_upper;
            let q_lower = expected_reward + gamma * e_lower;
            if best_upper.map_or(true, |(_, v)| q_upper > v) {
                best_upper = Some((action, q_upper));
            }
            if best_lower.map_or(true, |(_, v)| q_lower > v) {
                best_lower = Some((action, q_lower));
            }
        }

        let (a_upper, q_upper) = best_upper.unwrap();
        let (a_lower, q_lower) = best_lower.unwrap();
        let all_expanded = self.nodes[id].children.len() == sim.num_actions();
        let node = &mut self.nodes[id];
        node.best_action_upper = a_upper;
        node.best_action_lower = a_lower;
        if all_expanded && q_upper < node.upper {
            node.upper = q_upper;
        }
        if q_lower > node.lower {
            node.lower = q_lower;
        }
        if node.lower > node.upper {
            node.lower = node.upper;
        }
        Ok(())
    }

    /// Under the current best-lower action, pick the observation branch
    /// maximising `w(o) · ((child.upper - child.lower) - target)`.
    ///
    /// `target` is the current root gap; the score biases expansion toward
    /// wide-gap, high-probability branches. Returns `None` when the action
    /// has no AND-node or the best score is non-positive, which ends the
    /// traversal normally.
    pub fn choose_observation(&self, id: NodeId, target: f64) -> Option<NodeId> {
        let node = &self.nodes[id];
        let and = node.children.get(&node.best_action_lower)?;
        let mut best: Option<(f64, NodeId)> = None;
        for (obs, &child_id) in &and.observation_children {
            let weight = and.observation_weights[obs];
            let child = &self.nodes[child_id];
            let score = weight * (child.gap() - target);
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, child_id));
            }
        }
        let (score, child_id) = best?;
        if score > 0.0 {
            Some(child_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::MdpRolloutBound;
    use crate::fsc::FscNode;
    use crate::simulator::SimStep;
    use rand::SeedableRng;

    /// Two hidden rooms. The single action reveals the room: state 10
    /// lands in terminal state 1 (observation 1), state 20 in terminal
    /// state 2 (observation 2), both at cost 1.
    struct Reveal;

    impl Simulator for Reveal {
        fn num_actions(&self) -> usize {
            1
        }
        fn num_observations(&self) -> usize {
            3
        }
        fn discount(&self) -> f64 {
            0.9
        }
        fn step(&self, state: State, _action: Action, _rng: &mut StdRng) -> SimStep {
            match state {
                10 => SimStep { next_state: 1, observation: 1, reward: -1.0, done: false },
                20 => SimStep { next_state: 2, observation: 2, reward: -1.0, done: false },
                s => SimStep { next_state: s, observation: s, reward: 0.0, done: true },
            }
        }
        fn sample_start(&self, _rng: &mut StdRng) -> State {
            10
        }
        fn is_terminal(&self, state: State) -> bool {
            state == 1 || state == 2
        }
    }

    fn uniform_over(states: &[State]) -> Belief {
        Belief::from_weights(states.iter().map(|&s| (s, 1.0)).collect()).unwrap()
    }

    #[test]
    fn test_create_node_initialises_bounds() {
        let mut tree = BeliefTree::new();
        let mut h = MdpRolloutBound::new();
        let mut rng = StdRng::seed_from_u64(0);
        let id = tree
            .create_node(Belief::singleton(10), &Reveal, &mut h, 5, -10.0, &mut rng)
            .unwrap();
        let node = tree.node(id);
        assert!(node.lower() <= node.upper());
        assert_eq!(node.lower(), -10.0);
        assert_eq!(node.fsc_node(), None);
        assert_eq!(node.num_expanded(), 0);
    }

    #[test]
    fn test_floor_clamped_to_ceiling() {
        let mut tree = BeliefTree::new();
        let mut h = MdpRolloutBound::new();
        let mut rng = StdRng::seed_from_u64(0);
        // terminal belief: upper bound is 0, floor of +5 must not exceed it
        let id = tree
            .create_node(Belief::singleton(1), &Reveal, &mut h, 5, 5.0, &mut rng)
            .unwrap();
        assert!(tree.node(id).lower() <= tree.node(id).upper());
    }

    #[test]
    fn test_expand_action_builds_weighted_children() {
        let mut tree = BeliefTree::new();
        let mut h = MdpRolloutBound::new();
        let mut rng = StdRng::seed_from_u64(1);
        let id = tree
            .create_node(uniform_over(&[10, 20]), &Reveal, &mut h, 5, -10.0, &mut rng)
            .unwrap();
        tree.expand_action(id, 0, &Reveal, &mut h, 16, 5, -10.0, None, &mut rng)
            .unwrap();

        let and = tree.node(id).action_node(0).unwrap();
        assert_eq!(and.observation_children().len(), 2);
        let weight_sum: f64 = and.observation_weights().values().sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);
        assert!((and.observation_weights()[&1] - 0.5).abs() < 1e-9);
        assert!((and.expected_reward() - (-1.0)).abs() < 1e-12);
        for (&obs, &child) in and.observation_children() {
            assert!(obs == 1 || obs == 2);
            assert!(tree.node(child).belief().validate().is_ok());
            assert_eq!(tree.node(child).belief().len(), 1);
        }
        // expanding again is a no-op
        let children_before = tree.len();
        tree.expand_action(id, 0, &Reveal, &mut h, 16, 5, -10.0, None, &mut rng)
            .unwrap();
        assert_eq!(tree.len(), children_before);
    }

    #[test]
    fn test_expand_action_rejects_invalid_action() {
        let mut tree = BeliefTree::new();
        let mut h = MdpRolloutBound::new();
        let mut rng = StdRng::seed_from_u64(1);
        let id = tree
            .create_node(uniform_over(&[10, 20]), &Reveal, &mut h, 5, -10.0, &mut rng)
            .unwrap();
        assert!(tree
            .expand_action(id, 3, &Reveal, &mut h, 16, 5, -10.0, None, &mut rng)
            .is_err());
    }

    #[test]
    fn test_back_up_actions_tightens_bounds() {
        let mut tree = BeliefTree::new();
        let mut h = MdpRolloutBound::new();
        let mut fsc = Fsc::new();
        let mut rng = StdRng::seed_from_u64(2);
        let id = tree
            .create_node(uniform_over(&[10, 20]), &Reveal, &mut h, 5, -10.0, &mut rng)
            .unwrap();
        tree.expand_action(id, 0, &Reveal, &mut h, 16, 5, -10.0, None, &mut rng)
            .unwrap();

        let (upper_before, lower_before) = (tree.node(id).upper(), tree.node(id).lower());
        tree.back_up_actions(id, &mut fsc, -10.0, 10, &Reveal, &mut rng)
            .unwrap();
        let node = tree.node(id);
        assert!(node.upper() <= upper_before);
        assert!(node.lower() >= lower_before);
        assert!(node.lower() <= node.upper());
        assert_eq!(node.best_action_lower(), 0);
        assert_eq!(node.best_action_upper(), 0);
    }

    #[test]
    fn test_back_up_uses_attached_fsc_value() {
        let mut tree = BeliefTree::new();
        let mut h = MdpRolloutBound::new();
        let mut fsc = Fsc::new();
        let mut rng = StdRng::seed_from_u64(3);
        let id = tree
            .create_node(uniform_over(&[10, 20]), &Reveal, &mut h, 5, -10.0, &mut rng)
            .unwrap();
        tree.expand_action(id, 0, &Reveal, &mut h, 16, 5, -10.0, None, &mut rng)
            .unwrap();

        // attach a controller node to each child; its rollout at a terminal
        // state is worth 0, well above the -10 floor
        let fsc_idx = fsc.add_node(FscNode::new(0));
        let children: Vec<NodeId> = tree
            .node(id)
            .action_node(0)
            .unwrap()
            .observation_children()
            .values()
            .copied()
            .collect();
        for child in &children {
            tree.node_mut(*child).set_fsc_node(Some(fsc_idx));
        }
        tree.back_up_actions(id, &mut fsc, -10.0, 10, &Reveal, &mut rng)
            .unwrap();
        for child in children {
            assert!(tree.node(child).lower() > -10.0 + 1e-9);
        }
        // Q_lower = -1 + gamma * 0
        assert!((tree.node(id).lower() - (-1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_choose_observation_prefers_weighted_gap() {
        let mut tree = BeliefTree::new();
        let mut h = MdpRolloutBound::new();
        let mut rng = StdRng::seed_from_u64(4);
        let id = tree
            .create_node(uniform_over(&[10, 20]), &Reveal, &mut h, 5, -10.0, &mut rng)
            .unwrap();
        tree.expand_action(id, 0, &Reveal, &mut h, 16, 5, -10.0, None, &mut rng)
            .unwrap();

        // widen one child's gap by hand
        let and = tree.node(id).action_node(0).unwrap();
        let wide = and.observation_children()[&1];
        let narrow = and.observation_children()[&2];
        tree.nodes[wide].upper = 5.0;
        tree.nodes[wide].lower = -5.0;
        tree.nodes[narrow].upper = 0.1;
        tree.nodes[narrow].lower = 0.0;

        assert_eq!(tree.choose_observation(id, 0.0), Some(wide));
        // a target larger than every gap ends the traversal
        assert_eq!(tree.choose_observation(id, 100.0), None);
    }

    #[test]
    fn test_choose_observation_without_expansion() {
        let mut tree = BeliefTree::new();
        let mut h = MdpRolloutBound::new();
        let mut rng = StdRng::seed_from_u64(5);
        let id = tree
            .create_node(uniform_over(&[10, 20]), &Reveal, &mut h, 5, -10.0, &mut rng)
            .unwrap();
        assert_eq!(tree.choose_observation(id, 0.0), None);
    }
}
