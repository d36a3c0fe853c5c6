//! Cycle clock
//!
//! Reads the CPU's raw tick counter and calibrates its frequency against the
//! OS wall clock once per process. The calibration is not repeated, so
//! frequency scaling during a run skews tick-to-seconds conversions.

use common::constants::time::{CALIBRATION_WINDOW_MS, MICROS_PER_SEC, MILLIS_PER_SEC};
#[cfg(any(test, feature = "test-util"))]
use std::cell::Cell;
#[cfg(any(test, feature = "test-util"))]
use std::rc::Rc;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::debug;

/// Source of monotonically increasing ticks
pub trait TickSource {
    /// Current tick count
    fn ticks(&self) -> u64;
}

/// Hardware cycle counter (`rdtsc` on x86_64, `cntvct_el0` on aarch64)
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleClock;

impl CycleClock {
    /// Calibrated ticks per second, measured once per process
    #[must_use]
    pub fn frequency(&self) -> u64 {
        estimate_cpu_timer_freq()
    }
}

impl TickSource for CycleClock {
    #[inline(always)]
    fn ticks(&self) -> u64 {
        read_cpu_timer()
    }
}

/// Manually driven clock for deterministic tests
///
/// Clones share the same counter, so a test can keep one handle and advance
/// time while the tester owns the other. Only built for tests or with the
/// `test-util` feature.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

#[cfg(any(test, feature = "test-util"))]
impl ManualClock {
    /// Clock starting at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `ticks`
    pub fn advance(&self, ticks: u64) {
        self.now.set(self.now.get().saturating_add(ticks));
    }

    /// Jump to an absolute tick count
    pub fn set(&self, ticks: u64) {
        self.now.set(ticks);
    }
}

#[cfg(any(test, feature = "test-util"))]
impl TickSource for ManualClock {
    fn ticks(&self) -> u64 {
        self.now.get()
    }
}

fn process_start() -> Instant {
    static START: OnceLock<Instant> = OnceLock::new();
    *START.get_or_init(Instant::now)
}

/// OS timer resolution in ticks per second
#[must_use]
pub const fn os_timer_freq() -> u64 {
    MICROS_PER_SEC
}

/// Wall-clock microseconds since the first timer read in this process
#[must_use]
pub fn read_os_timer() -> u64 {
    u64::try_from(process_start().elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Raw CPU tick counter
#[inline(always)]
#[must_use]
pub fn read_cpu_timer() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: rdtsc is available on every x86_64 CPU
        unsafe { core::arch::x86_64::_rdtsc() }
    }

    #[cfg(target_arch = "aarch64")]
    {
        let ticks: u64;
        // SAFETY: the virtual counter is readable from user space
        unsafe {
            core::arch::asm!("mrs {}, cntvct_el0", out(reg) ticks, options(nomem, nostack));
        }
        ticks
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        u64::try_from(process_start().elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Count CPU ticks across `window_ms` of wall-clock time
///
/// Busy-waits for the whole window. Returns ticks per second.
#[must_use]
pub fn estimate_cpu_timer_freq_over(window_ms: u64) -> u64 {
    let os_freq = os_timer_freq();
    let os_wait = os_freq * window_ms / MILLIS_PER_SEC;

    let cpu_start = read_cpu_timer();
    let os_start = read_os_timer();
    let mut os_elapsed = 0;
    while os_elapsed < os_wait.max(1) {
        os_elapsed = read_os_timer().saturating_sub(os_start);
    }
    let cpu_elapsed = read_cpu_timer().saturating_sub(cpu_start);

    let freq = u128::from(os_freq) * u128::from(cpu_elapsed) / u128::from(os_elapsed);
    u64::try_from(freq).unwrap_or(u64::MAX)
}

/// Calibrated CPU timer frequency, measured once per process
#[must_use]
pub fn estimate_cpu_timer_freq() -> u64 {
    static FREQ: OnceLock<u64> = OnceLock::new();
    *FREQ.get_or_init(|| {
        let freq = estimate_cpu_timer_freq_over(CALIBRATION_WINDOW_MS);
        debug!(
            "Calibrated CPU timer over {} ms: {} ticks/s",
            CALIBRATION_WINDOW_MS, freq
        );
        freq
    })
}
