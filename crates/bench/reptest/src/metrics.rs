//! Per-trial metric vectors

#![allow(clippy::cast_precision_loss)] // Reporting conversions only

use common::constants::memory::GB;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Metrics tracked for every trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    /// Elapsed ticks inside timing brackets
    Time,
    /// Bytes processed
    Bytes,
    /// Floating point operations
    Flops,
    /// Memory loads and stores
    Memops,
}

impl MetricKind {
    /// Number of metric kinds
    pub const COUNT: usize = 4;

    /// All kinds in index order
    pub const ALL: [Self; Self::COUNT] = [Self::Time, Self::Bytes, Self::Flops, Self::Memops];

    /// Position in a [`MetricSample`]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Time => 0,
            Self::Bytes => 1,
            Self::Flops => 2,
            Self::Memops => 3,
        }
    }

    /// Lowercase name, used as a column header
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Bytes => "bytes",
            Self::Flops => "flops",
            Self::Memops => "memops",
        }
    }
}

/// Fixed vector of metric values indexed by [`MetricKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetricSample {
    values: [u64; MetricKind::COUNT],
}

impl MetricSample {
    /// All metrics zero
    pub const ZERO: Self = Self {
        values: [0; MetricKind::COUNT],
    };

    /// All metrics "infinite"; any real trial compares lower
    pub const INFINITE: Self = Self {
        values: [u64::MAX; MetricKind::COUNT],
    };

    /// Build a sample from explicit values
    #[must_use]
    pub const fn new(time: u64, bytes: u64, flops: u64, memops: u64) -> Self {
        Self {
            values: [time, bytes, flops, memops],
        }
    }

    /// Value for one metric
    #[must_use]
    pub const fn get(&self, kind: MetricKind) -> u64 {
        self.values[kind.index()]
    }

    /// Elapsed ticks
    #[must_use]
    pub const fn time(&self) -> u64 {
        self.get(MetricKind::Time)
    }

    /// Bytes processed
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.get(MetricKind::Bytes)
    }

    /// Floating point operations
    #[must_use]
    pub const fn flops(&self) -> u64 {
        self.get(MetricKind::Flops)
    }

    /// Memory operations
    #[must_use]
    pub const fn memops(&self) -> u64 {
        self.get(MetricKind::Memops)
    }

    /// Add `value` to one metric, saturating
    #[inline(always)]
    pub fn add(&mut self, kind: MetricKind, value: u64) {
        let slot = &mut self.values[kind.index()];
        *slot = slot.saturating_add(value);
    }

    /// Add every metric of `other`, saturating
    pub fn accumulate(&mut self, other: &Self) {
        for kind in MetricKind::ALL {
            self.add(kind, other.get(kind));
        }
    }

    /// Every metric divided by `count`
    #[must_use]
    pub fn divided_by(&self, count: u64) -> Self {
        if count == 0 {
            return Self::ZERO;
        }
        let mut out = Self::ZERO;
        for kind in MetricKind::ALL {
            out.values[kind.index()] = self.get(kind) / count;
        }
        out
    }

    /// Time converted to seconds (0 if the frequency is unknown)
    #[must_use]
    pub fn seconds(&self, tick_frequency: u64) -> f64 {
        if tick_frequency == 0 {
            return 0.0;
        }
        self.time() as f64 / tick_frequency as f64
    }

    /// Bytes per second in GiB/s
    #[must_use]
    pub fn gb_per_second(&self, tick_frequency: u64) -> f64 {
        let seconds = self.seconds(tick_frequency);
        if seconds > 0.0 {
            self.bytes() as f64 / (GB as f64 * seconds)
        } else {
            0.0
        }
    }

    /// Floating point throughput in GFLOP/s
    #[must_use]
    pub fn gflops_per_second(&self, tick_frequency: u64) -> f64 {
        let seconds = self.seconds(tick_frequency);
        if seconds > 0.0 {
            self.flops() as f64 / (1e9 * seconds)
        } else {
            0.0
        }
    }
}

impl Index<MetricKind> for MetricSample {
    type Output = u64;

    fn index(&self, kind: MetricKind) -> &u64 {
        &self.values[kind.index()]
    }
}

impl IndexMut<MetricKind> for MetricSample {
    fn index_mut(&mut self, kind: MetricKind) -> &mut u64 {
        &mut self.values[kind.index()]
    }
}

/// Accumulated results across the trials of one or more waves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResults {
    /// Trials finalised since the last reset
    pub trial_count: u64,
    /// Sum of every trial's metrics
    pub total: MetricSample,
    /// All metrics of the fastest trial
    pub min: MetricSample,
    /// All metrics of the slowest trial
    pub max: MetricSample,
}

impl Default for TestResults {
    fn default() -> Self {
        Self {
            trial_count: 0,
            total: MetricSample::ZERO,
            min: MetricSample::INFINITE,
            max: MetricSample::ZERO,
        }
    }
}

impl TestResults {
    /// Whether any trial has been recorded
    #[must_use]
    pub const fn has_trials(&self) -> bool {
        self.trial_count > 0
    }

    /// Mean of every metric, `None` before the first trial
    #[must_use]
    pub fn average(&self) -> Option<MetricSample> {
        self.has_trials()
            .then(|| self.total.divided_by(self.trial_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexing_matches_accessors() {
        let mut sample = MetricSample::new(100, 10, 4, 6);
        assert_eq!(sample[MetricKind::Time], 100);
        assert_eq!(sample[MetricKind::Bytes], 10);

        sample[MetricKind::Flops] += 2;
        assert_eq!(sample.flops(), 6);
    }

    #[test]
    fn test_add_saturates() {
        let mut sample = MetricSample::INFINITE;
        sample.add(MetricKind::Bytes, 1);
        assert_eq!(sample.bytes(), u64::MAX);
    }

    #[test]
    fn test_throughput_conversions() {
        let sample = MetricSample::new(1_000, GB as u64, 2_000_000_000, 0);
        assert!((sample.seconds(1_000) - 1.0).abs() < f64::EPSILON);
        assert!((sample.gb_per_second(1_000) - 1.0).abs() < 1e-9);
        assert!((sample.gflops_per_second(1_000) - 2.0).abs() < 1e-9);
        assert_eq!(sample.seconds(0), 0.0);
    }

    #[test]
    fn test_average() {
        let mut results = TestResults::default();
        assert!(results.average().is_none());

        results.trial_count = 2;
        results.total = MetricSample::new(300, 20, 0, 0);
        assert_eq!(results.average(), Some(MetricSample::new(150, 10, 0, 0)));
    }
}
