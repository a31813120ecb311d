//! # Finite-State Controller Store
//!
//! The policy produced by the planner is a finite-state controller: a graph
//! whose nodes commit to an action and whose edges are labelled by
//! observations. Nodes are stored append-only and addressed by dense,
//! stable indices; the graph may contain cycles. [`Fsc::find_or_insert`]
//! enforces the dedup invariant that no two stored nodes share the same
//! (best action, edge map) pair.
//!
//! Each node carries a lazy value cache: the first rollout from a given
//! state is simulated and memoised, later lookups return the stored value.
//! This cache is the implicit alpha vector of the node.

use crate::error::Result;
use crate::simulator::{Action, Observation, Simulator, State};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;

/// Observation-labelled outgoing edges of one controller node
pub type EdgeMap = BTreeMap<Observation, usize>;

/// One controller node: an action commitment plus the lazily grown
/// state-value cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FscNode {
    best_action: Action,
    value_cache: HashMap<State, f64>,
}

impl FscNode {
    pub fn new(best_action: Action) -> Self {
        FscNode {
            best_action,
            value_cache: HashMap::new(),
        }
    }

    /// Action executed while occupying this node
    pub fn best_action(&self) -> Action {
        self.best_action
    }

    /// Memoised rollout value at `state`, if one was computed
    pub fn cached_value(&self, state: State) -> Option<f64> {
        self.value_cache.get(&state).copied()
    }

    /// Insert a value into the cache. Entries are never overwritten; the
    /// first computed value stays authoritative within a run.
    pub fn cache_value(&mut self, state: State, value: f64) {
        self.value_cache.entry(state).or_insert(value);
    }

    /// Number of memoised states
    pub fn cache_len(&self) -> usize {
        self.value_cache.len()
    }

    /// Mean of the cached values, used as the node's value label in
    /// exports. Zero when nothing has been simulated yet.
    pub fn value_estimate(&self) -> f64 {
        if self.value_cache.is_empty() {
            return 0.0;
        }
        self.value_cache.values().sum::<f64>() / self.value_cache.len() as f64
    }
}

/// Append-only indexed store of controller nodes and their edges
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fsc {
    nodes: Vec<FscNode>,
    edges: Vec<EdgeMap>,
    start: Option<usize>,
}

impl Fsc {
    pub fn new() -> Self {
        Fsc::default()
    }

    /// Reserve space for roughly `max_node_size` nodes up front
    pub fn with_capacity(max_node_size: usize) -> Self {
        Fsc {
            nodes: Vec::with_capacity(max_node_size),
            edges: Vec::with_capacity(max_node_size),
            start: None,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Append a node and return its index. The edge slot starts empty.
    pub fn add_node(&mut self, node: FscNode) -> usize {
        self.nodes.push(node);
        self.edges.push(EdgeMap::new());
        self.nodes.len() - 1
    }

    /// Replace the edge map at `index`
    pub fn set_edges(&mut self, index: usize, edges: EdgeMap) {
        self.edges[index] = edges;
    }

    /// Target of the edge labelled `observation` out of `index`
    pub fn edge(&self, index: usize, observation: Observation) -> Option<usize> {
        self.edges[index].get(&observation).copied()
    }

    /// All edges out of `index`
    pub fn edges(&self, index: usize) -> &EdgeMap {
        &self.edges[index]
    }

    pub fn node(&self, index: usize) -> &FscNode {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut FscNode {
        &mut self.nodes[index]
    }

    /// Mark the node used as the execution entry point
    pub fn set_start(&mut self, index: usize) {
        self.start = Some(index);
    }

    pub fn start(&self) -> Option<usize> {
        self.start
    }

    /// Return the first index whose node matches `(best_action, edges)`,
    /// appending a fresh node when no structural duplicate exists. The
    /// best-action comparison short-circuits the edge-map check for most
    /// candidates.
    pub fn find_or_insert(&mut self, node: FscNode, edges: EdgeMap) -> usize {
        for i in 0..self.nodes.len() {
            if self.nodes[i].best_action == node.best_action && self.edges[i] == edges {
                return i;
            }
        }
        let index = self.add_node(node);
        self.set_edges(index, edges);
        index
    }

    /// Simulate one rollout through the controller starting at node
    /// `index` in `state`, accumulating `γ^t · r`.
    ///
    /// When the node pointer becomes unset before `depth_max` the rollout
    /// is closed with the terminal correction `γ^depth_max · r_lower`;
    /// a `done` transition breaks immediately.
    pub fn simulate_trajectory(
        &self,
        index: usize,
        state: State,
        depth_max: usize,
        r_lower: f64,
        sim: &dyn Simulator,
        rng: &mut StdRng,
    ) -> f64 {
        let gamma = sim.discount();
        let mut value = 0.0;
        let mut current = Some(index);
        let mut state = state;
        for step in 0..depth_max {
            match current {
                None => {
                    let correction = gamma.powi(depth_max as i32) * r_lower;
                    value += gamma.powi(step as i32) * correction;
                    break;
                }
                Some(i) => {
                    let action = self.nodes[i].best_action;
                    let outcome = sim.step(state, action, rng);
                    current = self.edge(i, outcome.observation);
                    value += gamma.powi(step as i32) * outcome.reward;
                    if outcome.done {
                        break;
                    }
                    state = outcome.next_state;
                }
            }
        }
        value
    }

    /// Memoised rollout value of node `index` at `state`.
    ///
    /// The first call simulates one trajectory and stores the result;
    /// repeated calls return the identical cached value, which keeps
    /// backups deterministic within a run.
    pub fn node_value(
        &mut self,
        index: usize,
        state: State,
        r_lower: f64,
        depth_max: usize,
        sim: &dyn Simulator,
        rng: &mut StdRng,
    ) -> f64 {
        if let Some(v) = self.nodes[index].cached_value(state) {
            return v;
        }
        let v = self.simulate_trajectory(index, state, depth_max, r_lower, sim, rng);
        self.nodes[index].cache_value(state, v);
        v
    }

    /// Write the controller as a Graphviz digraph.
    ///
    /// Each node is labelled with its index, action and value estimate;
    /// edges carry observation symbols. Empty name slices fall back to the
    /// raw identifiers. The start node is drawn with a thicker outline.
    pub fn generate_graphviz<W: Write>(
        &self,
        out: &mut W,
        actions: &[String],
        observations: &[String],
    ) -> Result<()> {
        writeln!(out, "digraph Fsc {{")?;
        writeln!(out, "node [shape=circle];")?;
        for (i, node) in self.nodes.iter().enumerate() {
            let action = actions
                .get(node.best_action as usize)
                .cloned()
                .unwrap_or_else(|| node.best_action.to_string());
            write!(
                out,
                " n{} [label=<<B>{}</B><BR/>a: {}<BR/>V: {:.3}>",
                i,
                i,
                action,
                node.value_estimate()
            )?;
            if Some(i) == self.start {
                write!(out, ", penwidth=3")?;
            }
            writeln!(out, "];")?;
            for (obs, target) in &self.edges[i] {
                let label = observations
                    .get(*obs as usize)
                    .cloned()
                    .unwrap_or_else(|| obs.to_string());
                write!(out, "n{} -> n{} [label=<{}>];", i, target, label)?;
            }
            writeln!(out)?;
        }
        writeln!(out, "}}")?;
        Ok(())
    }

    /// Save the controller to disk
    pub fn save(&self, path: &str) -> Result<()> {
        let serialized = bincode::serialize(self)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Load a controller from disk
    pub fn load(path: &str) -> Result<Self> {
        let data = std::fs::read(path)?;
        let fsc: Self = bincode::deserialize(&data)?;
        Ok(fsc)
    }
}
