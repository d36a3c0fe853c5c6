//! Core constants for the benchmarking workspace.
//!
//! Centralised here so the arena, the tester and the driver agree on
//! defaults without repeating magic numbers.

/// Memory size constants
pub mod memory {
    /// Kilobyte in bytes
    pub const KB: usize = 1024;

    /// Megabyte in bytes
    pub const MB: usize = 1024 * KB;

    /// Gigabyte in bytes
    pub const GB: usize = 1024 * MB;

    /// Page size assumed when the OS cannot be queried
    pub const FALLBACK_PAGE_SIZE: usize = 4 * KB;

    /// 2 MiB huge page
    pub const HUGE_PAGE_2MB: usize = 2 * MB;

    /// 1 GiB huge page
    pub const HUGE_PAGE_1GB: usize = GB;
}

/// Arena defaults
pub mod arena {
    use super::memory::{KB, MB};

    /// Default address space reserved per arena (256 MiB)
    pub const DEFAULT_RESERVE_SIZE: usize = 256 * MB;

    /// Default memory committed up front (64 KiB)
    pub const DEFAULT_COMMIT_SIZE: usize = 64 * KB;
}

/// Time-related constants
pub mod time {
    /// Milliseconds per second
    pub const MILLIS_PER_SEC: u64 = 1000;

    /// Microseconds per second
    pub const MICROS_PER_SEC: u64 = 1_000_000;

    /// Wall-clock window used to calibrate the cycle counter
    pub const CALIBRATION_WINDOW_MS: u64 = 100;
}

/// Benchmark driver defaults
pub mod bench {
    /// Seconds without a new minimum before a wave completes
    pub const DEFAULT_SECONDS_TO_TRY: u32 = 10;

    /// Number of densities in a sweep
    pub const DENSITY_STEPS: usize = 20;

    /// First density in a sweep
    pub const DENSITY_START: f64 = 0.01;

    /// Initial density increment, multiplied by 10 every 10 steps
    pub const DENSITY_DELTA: f64 = 0.001;

    /// Density used by the verification pass
    pub const VERIFY_DENSITY: f64 = 0.1;

    /// Absolute tolerance when comparing kernel output to the reference
    pub const VERIFY_EPSILON: f64 = 0.00001;

    /// Arena reservation used by the driver, in GiB of address space
    pub const DRIVER_RESERVE_GB: usize = 64;
}
