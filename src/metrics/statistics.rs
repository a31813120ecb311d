use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Summary statistics for a collection of returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStats {
    pub mean: f64,
    pub variance: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl EvaluationStats {
    /// Compute statistics from a slice of values
    pub fn from_slice(values: &[f64]) -> Self {
        let mut stats = RunningStats::new();
        stats.update_batch(values);
        stats.to_stats()
    }

    /// Compute statistics from an array view
    pub fn from_array(array: ArrayView1<f64>) -> Self {
        let mut stats = RunningStats::new();
        for &v in array.iter() {
            stats.update(v);
        }
        stats.to_stats()
    }

    pub fn std(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Running statistics that can be updated incrementally.
///
/// Welford's algorithm: numerically stable single-pass mean and variance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        RunningStats {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Update with a new value
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;

        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Update with multiple values
    pub fn update_batch(&mut self, values: &[f64]) {
        for &value in values {
            self.update(value);
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (n - 1 denominator)
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.max
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Reset the statistics
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Snapshot as an [`EvaluationStats`]
    pub fn to_stats(&self) -> EvaluationStats {
        EvaluationStats {
            mean: self.mean(),
            variance: self.variance(),
            min: self.min(),
            max: self.max(),
            count: self.count,
        }
    }
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}
