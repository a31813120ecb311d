//! # Monte-Carlo Backup
//!
//! The backup visits one belief node, re-expands and re-evaluates its
//! actions against the current controller, and emits (or dedup-reuses) the
//! controller node that realises the best simulated lower bound. Newly
//! minted indices propagate from the leaves toward the root because the
//! driver replays backups in reverse traversal order.

use crate::bounds::BoundHeuristic;
use crate::error::Result;
use crate::fsc::{EdgeMap, Fsc, FscNode};
use crate::simulator::{Action, Simulator};
use crate::tree::{BeliefTree, NodeId};
use rand::rngs::StdRng;

/// Parameters threaded through a backup
#[derive(Debug, Clone, Copy)]
pub struct BackupParams {
    pub max_belief_samples: usize,
    pub max_depth_sim: usize,
    pub eval_depth: usize,
    /// Materialise and attach controller nodes whose edge map came out
    /// empty, instead of clearing the belief node's link. Needed when an
    /// optimal action leads straight to terminal beliefs: the edgeless
    /// node is the policy there.
    pub attach_edgeless_nodes: bool,
}

/// Back up one belief node against the controller.
///
/// Expands every action, recomputes action values, then links the node to
/// the controller node `(a*, edges)` where `a*` is the best-lower action
/// and `edges` maps each observation to the controller index attached to
/// the corresponding child. Children that were never visited contribute no
/// edge; when no child carries an index at all the belief is effectively
/// terminal and the node's controller link is cleared instead of inserting
/// an edgeless node.
#[allow(clippy::too_many_arguments)]
pub fn back_up(
    tree: &mut BeliefTree,
    id: NodeId,
    fsc: &mut Fsc,
    sim: &dyn Simulator,
    heuristic: &mut dyn BoundHeuristic,
    params: BackupParams,
    r_lower: f64,
    rng: &mut StdRng,
) -> Result<()> {
    let bootstrap = fsc.start();
    for action in 0..sim.num_actions() as Action {
        tree.expand_action(
            id,
            action,
            sim,
            heuristic,
            params.max_belief_samples,
            params.eval_depth,
            r_lower,
            bootstrap,
            rng,
        )?;
    }
    tree.back_up_actions(id, fsc, r_lower, params.max_depth_sim, sim, rng)?;

    let best_action = tree.node(id).best_action_lower();
    let mut edges = EdgeMap::new();
    if let Some(and) = tree.node(id).action_node(best_action) {
        for (&obs, &child_id) in and.observation_children() {
            if let Some(index) = tree.node(child_id).fsc_node() {
                edges.insert(obs, index);
            }
        }
    }

    if edges.is_empty() && !params.attach_edgeless_nodes {
        tree.node_mut(id).set_fsc_node(None);
        return Ok(());
    }

    let index = fsc.find_or_insert(FscNode::new(best_action), edges);
    tree.node_mut(id).set_fsc_node(Some(index));
    Ok(())
}
