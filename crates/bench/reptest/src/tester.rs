//! Repetition tester
//!
//! Runs a workload repeatedly and keeps the fastest observed trial. A wave
//! ends once no faster trial has shown up for `seconds_to_try` seconds of
//! measured time.
//!
//! ```text
//! tester.new_wave(config);
//! while tester.is_testing() {
//!     tester.begin_time();
//!     // workload
//!     tester.close_time();
//!     tester.count_bytes(n);
//! }
//! let min = tester.results().min;
//! ```

#![allow(clippy::cast_precision_loss)] // Summary logging only

use crate::clock::{CycleClock, TickSource};
use crate::counters::OpCounters;
use crate::error::TrialError;
use crate::metrics::{MetricKind, MetricSample, TestResults};
use common::constants::bench::DEFAULT_SECONDS_TO_TRY;
use common::constants::time::MILLIS_PER_SEC;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace};

/// Tester lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TestState {
    /// No wave started yet
    #[default]
    Idle,
    /// Wave running, `is_testing` returns true
    Testing,
    /// Wave finished without errors
    Complete,
    /// Wave stopped on a rejected trial
    Error(TrialError),
}

impl TestState {
    /// Short name used in diagnostics
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Testing => "testing",
            Self::Complete => "complete",
            Self::Error(_) => "in error",
        }
    }
}

/// Parameters of one measurement wave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveConfig {
    /// Expected bytes per trial, 0 disables the check
    pub target_bytes: u64,
    /// Ticks per second of the tester's clock
    pub tick_frequency: u64,
    /// Stop after this many seconds without a new minimum
    pub seconds_to_try: u32,
    /// Optional hard cap on trials in this wave
    pub max_trials: Option<u64>,
}

impl WaveConfig {
    /// Wave with the default timeout and no byte target
    #[must_use]
    pub const fn new(tick_frequency: u64) -> Self {
        Self {
            target_bytes: 0,
            tick_frequency,
            seconds_to_try: DEFAULT_SECONDS_TO_TRY,
            max_trials: None,
        }
    }

    /// Require every trial to report exactly `bytes`
    #[must_use]
    pub const fn with_target_bytes(mut self, bytes: u64) -> Self {
        self.target_bytes = bytes;
        self
    }

    #[must_use]
    pub const fn with_seconds_to_try(mut self, seconds: u32) -> Self {
        self.seconds_to_try = seconds;
        self
    }

    #[must_use]
    pub const fn with_max_trials(mut self, trials: u64) -> Self {
        self.max_trials = Some(trials);
        self
    }

    /// Timeout expressed in ticks
    #[must_use]
    pub const fn timeout_ticks(&self) -> u64 {
        (self.seconds_to_try as u64).saturating_mul(self.tick_frequency)
    }
}

/// Metrics gathered for the trial in progress
#[derive(Debug, Clone, Copy, Default)]
struct TrialAccumulator {
    sample: MetricSample,
    open_since: Option<u64>,
    brackets: u32,
    reported: bool,
}

/// Per-wave bookkeeping
#[derive(Debug, Clone, Copy, Default)]
struct Wave {
    trials: u64,
    ticks_since_improvement: u64,
    timeout_ticks: u64,
    started: bool,
}

/// Min-tracking benchmark driver
#[derive(Debug)]
pub struct RepetitionTester<C: TickSource = CycleClock> {
    clock: C,
    state: TestState,
    config: WaveConfig,
    wave: Wave,
    trial: TrialAccumulator,
    results: TestResults,
    keep_results: bool,
}

impl RepetitionTester<CycleClock> {
    /// Tester on the hardware cycle counter
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(CycleClock)
    }
}

impl Default for RepetitionTester<CycleClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: TickSource> RepetitionTester<C> {
    /// Tester reading ticks from `clock`
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: TestState::Idle,
            config: WaveConfig::new(0),
            wave: Wave::default(),
            trial: TrialAccumulator::default(),
            results: TestResults::default(),
            keep_results: false,
        }
    }

    /// Start a wave
    ///
    /// The first wave (and the first after [`reset`](Self::reset)) starts
    /// from empty results. Later waves keep the previous minimum, so a wave
    /// only ends early if it fails to beat every earlier wave.
    pub fn new_wave(&mut self, config: WaveConfig) {
        if !self.keep_results {
            self.results = TestResults::default();
            self.keep_results = true;
        }

        self.config = config;
        self.trial = TrialAccumulator::default();
        self.wave = Wave {
            timeout_ticks: config.timeout_ticks(),
            ..Wave::default()
        };

        if config.tick_frequency == 0 && config.seconds_to_try > 0 {
            self.fail(TrialError::ZeroFrequency {
                seconds_to_try: config.seconds_to_try,
            });
            return;
        }

        debug!(
            target_bytes = config.target_bytes,
            seconds_to_try = config.seconds_to_try,
            max_trials = ?config.max_trials,
            "Starting wave"
        );
        self.state = TestState::Testing;
    }

    /// Drop all results; the next wave starts fresh
    pub fn reset(&mut self) {
        self.state = TestState::Idle;
        self.wave = Wave::default();
        self.trial = TrialAccumulator::default();
        self.results = TestResults::default();
        self.keep_results = false;
    }

    /// Open a timing bracket
    #[inline]
    pub fn begin_time(&mut self) {
        if !self.check_testing("begin_time") {
            return;
        }
        if self.trial.open_since.is_some() {
            self.fail(TrialError::NestedBegin {
                trial: self.trial_number(),
            });
            return;
        }
        self.trial.brackets += 1;
        self.trial.open_since = Some(self.clock.ticks());
    }

    /// Close the open bracket, adding its ticks to the trial
    #[inline]
    pub fn close_time(&mut self) {
        let now = self.clock.ticks();
        if !self.check_testing("close_time") {
            return;
        }
        match self.trial.open_since.take() {
            Some(start) => self
                .trial
                .sample
                .add(MetricKind::Time, now.saturating_sub(start)),
            None => self.fail(TrialError::CloseWithoutBegin {
                trial: self.trial_number(),
            }),
        }
    }

    /// Report bytes processed by this trial
    pub fn count_bytes(&mut self, bytes: u64) {
        self.count(MetricKind::Bytes, bytes, "count_bytes");
    }

    /// Report floating point operations
    pub fn count_flops(&mut self, flops: u64) {
        self.count(MetricKind::Flops, flops, "count_flops");
    }

    /// Report memory operations
    pub fn count_memops(&mut self, memops: u64) {
        self.count(MetricKind::Memops, memops, "count_memops");
    }

    /// Report both counters at once
    pub fn count_ops(&mut self, counters: &OpCounters) {
        self.count(MetricKind::Flops, counters.flops, "count_ops");
        self.count(MetricKind::Memops, counters.memops, "count_ops");
    }

    /// Finalise the previous trial and decide whether to run another
    ///
    /// A trial that does not beat the minimum adds its measured ticks, and
    /// at least one, to the timeout.
    pub fn is_testing(&mut self) -> bool {
        if self.state != TestState::Testing {
            return false;
        }

        if !self.wave.started {
            self.wave.started = true;
            return true;
        }

        if let Err(err) = self.finalize_trial() {
            self.fail(err);
            return false;
        }

        let capped = self
            .config
            .max_trials
            .is_some_and(|max| self.wave.trials >= max);
        if capped || self.wave.ticks_since_improvement >= self.wave.timeout_ticks {
            self.state = TestState::Complete;
            self.log_summary();
            return false;
        }

        true
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> &TestState {
        &self.state
    }

    /// Results so far, also readable after an error
    #[must_use]
    pub const fn results(&self) -> &TestResults {
        &self.results
    }

    /// Results, or the error that stopped the wave
    pub fn finish(&self) -> Result<&TestResults, TrialError> {
        match &self.state {
            TestState::Error(err) => Err(err.clone()),
            _ => Ok(&self.results),
        }
    }

    /// Configuration of the current wave
    #[must_use]
    pub const fn config(&self) -> &WaveConfig {
        &self.config
    }

    /// Trials finalised in the current wave
    #[must_use]
    pub const fn wave_trials(&self) -> u64 {
        self.wave.trials
    }

    /// Measured ticks since the minimum last improved
    #[must_use]
    pub const fn ticks_since_improvement(&self) -> u64 {
        self.wave.ticks_since_improvement
    }

    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    fn trial_number(&self) -> u64 {
        self.wave.trials + 1
    }

    fn check_testing(&mut self, operation: &'static str) -> bool {
        if self.state == TestState::Testing {
            return true;
        }
        // An earlier rejection wins over follow-up misuse
        if !matches!(self.state, TestState::Error(_)) {
            self.fail(TrialError::NotTesting {
                operation,
                state: self.state.name(),
            });
        }
        false
    }

    fn count(&mut self, kind: MetricKind, value: u64, operation: &'static str) {
        if self.check_testing(operation) {
            self.trial.sample.add(kind, value);
            self.trial.reported = true;
        }
    }

    fn finalize_trial(&mut self) -> Result<(), TrialError> {
        let trial = std::mem::take(&mut self.trial);
        let number = self.trial_number();

        if trial.open_since.is_some() {
            return Err(TrialError::UnclosedBracket { trial: number });
        }
        match (trial.brackets > 0, trial.reported) {
            (false, false) => return Err(TrialError::EmptyTrial { trial: number }),
            (false, true) => return Err(TrialError::NoTimeRecorded { trial: number }),
            (true, false) => return Err(TrialError::NoMetricsReported { trial: number }),
            (true, true) => {}
        }

        let sample = trial.sample;
        let target = self.config.target_bytes;
        if target != 0 && sample.bytes() != target {
            return Err(TrialError::ByteCountMismatch {
                trial: number,
                expected: target,
                actual: sample.bytes(),
            });
        }

        self.wave.trials += 1;
        self.results.trial_count += 1;
        self.results.total.accumulate(&sample);

        let time = sample.time();
        if time < self.results.min.time() {
            self.results.min = sample;
            self.wave.ticks_since_improvement = 0;
        } else {
            self.wave.ticks_since_improvement =
                self.wave.ticks_since_improvement.saturating_add(time.max(1));
        }
        if time > self.results.max.time() || self.results.trial_count == 1 {
            self.results.max = sample;
        }

        trace!(
            trial = number,
            time,
            bytes = sample.bytes(),
            min = self.results.min.time(),
            "Trial finished"
        );
        Ok(())
    }

    fn fail(&mut self, err: TrialError) {
        error!("Repetition tester error: {}", err);
        self.state = TestState::Error(err);
    }

    fn log_summary(&self) {
        let frequency = self.config.tick_frequency;
        let results = &self.results;
        let average = results.average().unwrap_or(MetricSample::ZERO);

        if frequency == 0 {
            info!(
                trials = results.trial_count,
                "Wave complete: min {} ticks, max {} ticks, avg {} ticks",
                results.min.time(),
                results.max.time(),
                average.time()
            );
            return;
        }

        let ms = |sample: &MetricSample| sample.seconds(frequency) * MILLIS_PER_SEC as f64;
        info!(
            trials = results.trial_count,
            "Wave complete: min {:.4} ms ({:.3} GB/s, {:.3} GFLOP/s), max {:.4} ms, avg {:.4} ms",
            ms(&results.min),
            results.min.gb_per_second(frequency),
            results.min.gflops_per_second(frequency),
            ms(&results.max),
            ms(&average)
        );
    }
}
