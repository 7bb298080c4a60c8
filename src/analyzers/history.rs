//! Fixed-capacity rolling history with the baseline statistics agents use.

use std::collections::VecDeque;

/// A ring buffer of the most recent `capacity` observations.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest observation when full.
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let var = self
            .values
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / self.values.len() as f64;
        Some(var.sqrt())
    }

    /// Percentile in `[0, 100]` with linear interpolation between ranks.
    pub fn percentile(&self, pct: f64) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.values.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        let frac = rank - lo as f64;
        Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
    }

    /// Least-squares slope per sample over the newest `n` observations.
    ///
    /// `None` with fewer than two observations.
    pub fn slope(&self, n: usize) -> Option<f64> {
        let start = self.values.len().saturating_sub(n);
        let ys: Vec<f64> = self.values.iter().skip(start).copied().collect();
        if ys.len() < 2 {
            return None;
        }
        let count = ys.len() as f64;
        let x_mean = (count - 1.0) / 2.0;
        let y_mean = ys.iter().sum::<f64>() / count;
        let mut num = 0.0;
        let mut den = 0.0;
        for (i, y) in ys.iter().enumerate() {
            let dx = i as f64 - x_mean;
            num += dx * (y - y_mean);
            den += dx * dx;
        }
        Some(num / den)
    }
}
