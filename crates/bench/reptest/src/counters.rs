//! Explicit instrumentation counters
//!
//! Kernels take an [`OpCounter`] by `&mut` instead of bumping global
//! counters. [`NoCount`] compiles every call away; [`OpCounters`]
//! accumulates totals that the workload reports to the tester after
//! closing its timing bracket.

/// Sink for simulated operation counts
pub trait OpCounter {
    /// Record `count` floating point operations
    fn flops(&mut self, count: u64);

    /// Record `count` memory operations
    fn memops(&mut self, count: u64);

    /// Fused multiply-add: two flops
    #[inline(always)]
    fn fmadd(&mut self) {
        self.flops(2);
    }

    /// One load
    #[inline(always)]
    fn load(&mut self) {
        self.memops(1);
    }

    /// One store
    #[inline(always)]
    fn store(&mut self) {
        self.memops(1);
    }
}

/// Accumulating counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounters {
    pub flops: u64,
    pub memops: u64,
}

impl OpCounters {
    /// Zeroed counters
    #[must_use]
    pub const fn new() -> Self {
        Self {
            flops: 0,
            memops: 0,
        }
    }

    /// Zero both counters
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl OpCounter for OpCounters {
    #[inline(always)]
    fn flops(&mut self, count: u64) {
        self.flops += count;
    }

    #[inline(always)]
    fn memops(&mut self, count: u64) {
        self.memops += count;
    }
}

/// Counter that records nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCount;

impl OpCounter for NoCount {
    #[inline(always)]
    fn flops(&mut self, _count: u64) {}

    #[inline(always)]
    fn memops(&mut self, _count: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot<C: OpCounter>(counter: &mut C, a: &[f64], b: &[f64]) -> f64 {
        let mut sum = 0.0;
        for (x, y) in a.iter().zip(b) {
            counter.load();
            counter.load();
            sum += x * y;
            counter.fmadd();
        }
        sum
    }

    #[test]
    fn test_counters_accumulate() {
        let mut counters = OpCounters::new();
        let result = dot(&mut counters, &[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]);

        assert_eq!(result, 32.0);
        assert_eq!(counters.flops, 6);
        assert_eq!(counters.memops, 6);

        counters.reset();
        assert_eq!(counters, OpCounters::default());
    }

    #[test]
    fn test_no_count_matches_result() {
        assert_eq!(dot(&mut NoCount, &[1.0, 2.0], &[3.0, 4.0]), 11.0);
    }
}
