//! # MCVI - Monte-Carlo Value Iteration for POMDPs
//!
//! MCVI is a Rust library for planning in partially observable Markov
//! decision processes through a black-box simulator. Given a simulator and
//! an initial belief it produces a policy finite-state controller (FSC): a
//! directed graph whose nodes prescribe an action and whose edges are
//! labelled by observations.
//!
//! ## Key Features
//!
//! - **Black-box planning**: only a step/sample/terminal simulator
//!   interface is required, no explicit transition matrices
//! - **Anytime bounds**: every belief carries admissible upper and lower
//!   value bounds that tighten monotonically across iterations
//! - **Compact policies**: structurally equivalent controller nodes are
//!   deduplicated, keeping the FSC small
//! - **Reproducibility**: a fixed seed and a deterministic simulator
//!   reproduce the same controller
//! - **Tooling**: Graphviz export, bincode persistence and per-iteration
//!   planning metrics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mcvi::belief::Belief;
//! use mcvi::bounds::MdpRolloutBound;
//! use mcvi::planner::{McviPlanner, PlannerConfig};
//! use mcvi::simulator::{Action, SimStep, Simulator, State};
//! use rand::rngs::StdRng;
//!
//! // A one-step corridor: the single action reaches the goal.
//! struct Corridor;
//!
//! impl Simulator for Corridor {
//!     fn num_actions(&self) -> usize { 1 }
//!     fn num_observations(&self) -> usize { 1 }
//!     fn discount(&self) -> f64 { 0.95 }
//!     fn step(&self, state: State, _action: Action, _rng: &mut StdRng) -> SimStep {
//!         SimStep {
//!             next_state: 1,
//!             observation: 0,
//!             reward: if state == 0 { 1.0 } else { 0.0 },
//!             done: true,
//!         }
//!     }
//!     fn sample_start(&self, _rng: &mut StdRng) -> State { 0 }
//!     fn is_terminal(&self, state: State) -> bool { state == 1 }
//! }
//!
//! let config = PlannerConfig::builder().epsilon(0.01).build().unwrap();
//! let mut planner = McviPlanner::new(
//!     Corridor,
//!     MdpRolloutBound::new(),
//!     Belief::singleton(0),
//!     config,
//!     42, // rng seed
//! ).unwrap();
//!
//! let summary = planner.plan().unwrap();
//! let stats = planner.evaluate_with_fsc(20, 1000, 100).unwrap();
//! println!("converged: {}, mean return: {:.3}", summary.converged, stats.mean);
//! ```
//!
//! ## Module Organization
//!
//! - [`backup`] - Monte-Carlo backup emitting deduplicated controller nodes
//! - [`belief`] - Sparse belief distributions and weighted sampling
//! - [`bounds`] - Safe lower floor and admissible upper-bound heuristics
//! - [`error`] - Error types and result handling
//! - [`fsc`] - The finite-state controller store
//! - [`metrics`] - Evaluation statistics and planning history
//! - [`planner`] - The planning driver and configuration
//! - [`simulator`] - The black-box POMDP simulator contract
//! - [`tree`] - The AND/OR belief expansion tree

pub mod backup;
pub mod belief;
pub mod bounds;
pub mod error;
pub mod fsc;
pub mod metrics;
pub mod planner;
pub mod simulator;
pub mod tree;
