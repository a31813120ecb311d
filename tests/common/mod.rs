//! Small POMDP simulators shared by the integration tests.

#![allow(dead_code)]

use mcvi::simulator::{Action, Observation, SimStep, Simulator, State};
use rand::rngs::StdRng;
use rand::Rng;

/// Single state, single action, reward 1, terminal after one step.
pub struct SingleStepChain;

impl Simulator for SingleStepChain {
    fn num_actions(&self) -> usize {
        1
    }
    fn num_observations(&self) -> usize {
        1
    }
    fn discount(&self) -> f64 {
        0.9
    }
    fn step(&self, state: State, _action: Action, _rng: &mut StdRng) -> SimStep {
        if state == 0 {
            SimStep { next_state: 1, observation: 0, reward: 1.0, done: true }
        } else {
            SimStep { next_state: 1, observation: 0, reward: 0.0, done: true }
        }
    }
    fn sample_start(&self, _rng: &mut StdRng) -> State {
        0
    }
    fn is_terminal(&self, state: State) -> bool {
        state == 1
    }
}

/// Two-arm bandit: one state, rewards 1 and 2, no terminal state.
pub struct TwoArmBandit;

impl Simulator for TwoArmBandit {
    fn num_actions(&self) -> usize {
        2
    }
    fn num_observations(&self) -> usize {
        1
    }
    fn discount(&self) -> f64 {
        0.95
    }
    fn step(&self, _state: State, action: Action, _rng: &mut StdRng) -> SimStep {
        SimStep {
            next_state: 0,
            observation: 0,
            reward: (action + 1) as f64,
            done: false,
        }
    }
    fn sample_start(&self, _rng: &mut StdRng) -> State {
        0
    }
    fn is_terminal(&self, _state: State) -> bool {
        false
    }
}

/// The classic tiger problem. State 0 puts the tiger behind the left
/// door, state 1 behind the right. Listening costs 1 and reports the
/// tiger's side with accuracy 0.85; opening the tiger-free door pays 10,
/// opening onto the tiger costs 100, and either open resets the problem.
pub struct Tiger;

pub const TIGER_LISTEN: Action = 0;
pub const TIGER_OPEN_LEFT: Action = 1;
pub const TIGER_OPEN_RIGHT: Action = 2;

impl Simulator for Tiger {
    fn num_actions(&self) -> usize {
        3
    }
    fn num_observations(&self) -> usize {
        2
    }
    fn discount(&self) -> f64 {
        0.95
    }
    fn step(&self, state: State, action: Action, rng: &mut StdRng) -> SimStep {
        if action == TIGER_LISTEN {
            let heard = if rng.gen_bool(0.85) { state } else { 1 - state };
            return SimStep {
                next_state: state,
                observation: heard,
                reward: -1.0,
                done: false,
            };
        }
        let tiger_left = state == 0;
        let opened_left = action == TIGER_OPEN_LEFT;
        let reward = if opened_left == tiger_left { -100.0 } else { 10.0 };
        SimStep {
            next_state: if rng.gen_bool(0.5) { 0 } else { 1 },
            observation: if rng.gen_bool(0.5) { 0 } else { 1 },
            reward,
            done: false,
        }
    }
    fn sample_start(&self, rng: &mut StdRng) -> State {
        if rng.gen_bool(0.5) {
            0
        } else {
            1
        }
    }
    fn is_terminal(&self, _state: State) -> bool {
        false
    }
}

/// Canadian Traveller on the line graph 0 - 1 - 2. The edge 0-1 is always
/// open, the edge 1-2 is blocked with probability one half; the blockage
/// is only observable from node 1. Actions move to a named node or declare
/// the goal unreachable; declaring correctly ends the episode at no cost.
///
/// State encoding: `loc * 2 + open` with `open = 1` when edge 1-2 is
/// traversable. Observations: `loc * 2 + status`, status visible at node 1
/// only.
pub struct LineCtp;

pub const CTP_DECIDE_UNREACHABLE: Action = 3;
const CTP_IDLE_REWARD: f64 = -5.0;
const CTP_BAD_REWARD: f64 = -50.0;

fn ctp_loc(state: State) -> i64 {
    state / 2
}

fn ctp_open(state: State) -> bool {
    state % 2 == 1
}

fn ctp_encode(loc: i64, open: bool) -> State {
    loc * 2 + open as i64
}

impl LineCtp {
    fn observe(&self, state: State) -> Observation {
        let loc = ctp_loc(state);
        let status = if loc == 1 && ctp_open(state) { 1 } else { 0 };
        loc * 2 + status
    }
}

impl Simulator for LineCtp {
    fn num_actions(&self) -> usize {
        4
    }
    fn num_observations(&self) -> usize {
        6
    }
    fn discount(&self) -> f64 {
        0.95
    }
    fn step(&self, state: State, action: Action, _rng: &mut StdRng) -> SimStep {
        let loc = ctp_loc(state);
        let open = ctp_open(state);
        if loc == 2 {
            return SimStep {
                next_state: state,
                observation: self.observe(state),
                reward: 0.0,
                done: true,
            };
        }
        let (next, reward, done) = match action {
            CTP_DECIDE_UNREACHABLE => {
                if open {
                    (state, CTP_BAD_REWARD, false)
                } else {
                    (ctp_encode(2, open), 0.0, true)
                }
            }
            a if a == loc => (state, CTP_IDLE_REWARD, false),
            0 if loc == 1 => (ctp_encode(0, open), -1.0, false),
            1 if loc == 0 => (ctp_encode(1, open), -1.0, false),
            2 if loc == 1 && open => (ctp_encode(2, open), -1.0, true),
            _ => (state, CTP_BAD_REWARD, false),
        };
        SimStep {
            next_state: next,
            observation: self.observe(next),
            reward,
            done,
        }
    }
    fn sample_start(&self, rng: &mut StdRng) -> State {
        ctp_encode(0, rng.gen_bool(0.5))
    }
    fn is_terminal(&self, state: State) -> bool {
        ctp_loc(state) == 2
    }
}

/// Degenerate traveller problem where the only route to the goal is a
/// stochastic edge blocked with probability 0.6: declaring the goal
/// unreachable is the root-optimal action.
///
/// Nodes 0 (origin) and 1 (goal); state `loc * 2 + open`; the edge status
/// is observable from either endpoint.
pub struct UnreachableCtp;

pub const UCTP_DECIDE_UNREACHABLE: Action = 2;

impl Simulator for UnreachableCtp {
    fn num_actions(&self) -> usize {
        3
    }
    fn num_observations(&self) -> usize {
        4
    }
    fn discount(&self) -> f64 {
        0.95
    }
    fn step(&self, state: State, action: Action, _rng: &mut StdRng) -> SimStep {
        let loc = ctp_loc(state);
        let open = ctp_open(state);
        if loc == 1 {
            return SimStep { next_state: state, observation: state, reward: 0.0, done: true };
        }
        let (next, reward, done) = match action {
            UCTP_DECIDE_UNREACHABLE => {
                if open {
                    (state, CTP_BAD_REWARD, false)
                } else {
                    (ctp_encode(1, open), 0.0, true)
                }
            }
            0 => (state, CTP_IDLE_REWARD, false),
            1 if open => (ctp_encode(1, open), -1.0, true),
            _ => (state, CTP_BAD_REWARD, false),
        };
        SimStep { next_state: next, observation: next, reward, done }
    }
    fn sample_start(&self, rng: &mut StdRng) -> State {
        // blocked with probability 0.6
        ctp_encode(0, !rng.gen_bool(0.6))
    }
    fn is_terminal(&self, state: State) -> bool {
        ctp_loc(state) == 1
    }
}
