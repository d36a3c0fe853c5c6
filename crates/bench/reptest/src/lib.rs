//! Repetition tester
//!
//! Measures a workload by running it over and over and keeping the fastest
//! trial. Timing comes from the CPU's cycle counter ([`CycleClock`]), whose
//! frequency is calibrated once against the OS clock. Flop and memory
//! operation counts are gathered in explicit [`OpCounters`] passed into the
//! workload.

pub mod clock;
pub mod counters;
pub mod error;
pub mod metrics;
pub mod tester;

pub use clock::{
    CycleClock, TickSource, estimate_cpu_timer_freq, estimate_cpu_timer_freq_over, os_timer_freq,
    read_cpu_timer, read_os_timer,
};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use counters::{NoCount, OpCounter, OpCounters};
pub use error::TrialError;
pub use metrics::{MetricKind, MetricSample, TestResults};
pub use tester::{RepetitionTester, TestState, WaveConfig};
