use serde::Serialize;
use std::ops::AddAssign;

/// Running arithmetic mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Average {
    count: u64,
    mean: f64,
}

impl Average {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
    }

    /// Mean of all pushed values, zero when nothing was pushed.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Combines two running means as if all values had been pushed into one.
    pub fn merge(&mut self, other: &Average) {
        let count = self.count + other.count;
        if count == 0 {
            return;
        }
        self.mean = (self.mean * self.count as f64 + other.mean * other.count as f64) / count as f64;
        self.count = count;
    }
}

impl AddAssign<f64> for Average {
    fn add_assign(&mut self, value: f64) {
        self.push(value);
    }
}
