use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Per-iteration planning history: root bounds, gap and controller size.
///
/// Histories are bounded; once `history_size` iterations are stored the
/// oldest entries are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningMetrics {
    /// Root upper bound per iteration
    pub upper_bounds: VecDeque<f64>,

    /// Root lower bound per iteration
    pub lower_bounds: VecDeque<f64>,

    /// Root bound gap per iteration
    pub gaps: VecDeque<f64>,

    /// Controller size per iteration
    pub fsc_sizes: VecDeque<usize>,

    history_size: usize,
    iteration_count: usize,
}

impl PlanningMetrics {
    pub fn new(history_size: usize) -> Self {
        PlanningMetrics {
            upper_bounds: VecDeque::with_capacity(history_size),
            lower_bounds: VecDeque::with_capacity(history_size),
            gaps: VecDeque::with_capacity(history_size),
            fsc_sizes: VecDeque::with_capacity(history_size),
            history_size,
            iteration_count: 0,
        }
    }

    /// Record one planner iteration
    pub fn record_iteration(&mut self, upper: f64, lower: f64, fsc_size: usize) {
        if self.upper_bounds.len() >= self.history_size {
            self.upper_bounds.pop_front();
            self.lower_bounds.pop_front();
            self.gaps.pop_front();
            self.fsc_sizes.pop_front();
        }
        self.upper_bounds.push_back(upper);
        self.lower_bounds.push_back(lower);
        self.gaps.push_back(upper - lower);
        self.fsc_sizes.push_back(fsc_size);
        self.iteration_count += 1;
    }

    /// Total iterations recorded, including any dropped from history
    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    /// Most recent root gap
    pub fn latest_gap(&self) -> Option<f64> {
        self.gaps.back().copied()
    }

    /// Clear all recorded history
    pub fn clear(&mut self) {
        *self = Self::new(self.history_size);
    }

    /// Save the history as JSON
    pub fn save(&self, path: &str) -> crate::error::Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Load a history from JSON
    pub fn load(path: &str) -> crate::error::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

impl Default for PlanningMetrics {
    fn default() -> Self {
        Self::new(1000)
    }
}
