//! Repetition tester error types

use thiserror::Error;

/// Caller-discipline violations detected by the tester
///
/// Any of these moves the tester into its error state; the wave stops and
/// the results gathered so far stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrialError {
    /// `close_time` with no open bracket
    #[error("close_time called without a matching begin_time (trial {trial})")]
    CloseWithoutBegin { trial: u64 },

    /// `begin_time` while a bracket is already open
    #[error("begin_time called while a timing bracket is already open (trial {trial})")]
    NestedBegin { trial: u64 },

    /// Trial finalised with a bracket still open
    #[error("Trial {trial} ended with an open timing bracket")]
    UnclosedBracket { trial: u64 },

    /// Metrics reported but nothing was timed
    #[error("Trial {trial} reported metrics without any timing bracket")]
    NoTimeRecorded { trial: u64 },

    /// Timed but no bytes, flops or memops reported
    #[error("Trial {trial} was timed but reported no bytes, flops or memops")]
    NoMetricsReported { trial: u64 },

    /// The workload did nothing between two `is_testing` checks
    #[error("Trial {trial} ran without calling begin_time or reporting metrics")]
    EmptyTrial { trial: u64 },

    /// Byte count differs from the wave's target
    #[error("Trial {trial} processed {actual} bytes, wave expects {expected}")]
    ByteCountMismatch {
        trial: u64,
        expected: u64,
        actual: u64,
    },

    /// Timeout needs a tick frequency
    #[error("Wave needs a non-zero tick frequency to time out after {seconds_to_try} s")]
    ZeroFrequency { seconds_to_try: u32 },

    /// Bracket or count call outside of a running wave
    #[error("{operation} called while the tester is {state}")]
    NotTesting {
        operation: &'static str,
        state: &'static str,
    },
}
