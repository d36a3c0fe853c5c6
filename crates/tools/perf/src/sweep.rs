//! Verification pass and density sweep

use crate::formats::{MatrixReps, random_dense};
use crate::kernels::{KernelKind, KernelParams, run_trial};
use crate::report::{KernelSeries, SweepReport, SweepRow};
use anyhow::{Context, Result};
use arena::{Arena, ArenaResult};
use chrono::Local;
use common::constants::bench::{
    DENSITY_DELTA, DENSITY_START, DENSITY_STEPS, VERIFY_DENSITY, VERIFY_EPSILON,
};
use rand::Rng;
use reptest::{OpCounters, RepetitionTester, TestResults, TickSource, TrialError, WaveConfig};
use tracing::{error, info};

/// Problem shape and timing settings shared by every wave
#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    pub row_count: usize,
    pub col_count: usize,
    pub inner_count: usize,
    pub seconds_to_try: u32,
    pub tick_frequency: u64,
}

impl SweepConfig {
    fn wave(&self) -> WaveConfig {
        WaveConfig::new(self.tick_frequency).with_seconds_to_try(self.seconds_to_try)
    }
}

/// Densities visited by the sweep
///
/// Starts at `DENSITY_START`; the increment is multiplied by 10 at every
/// tenth step, so the sweep is fine-grained at low densities.
#[must_use]
pub fn densities() -> [f64; DENSITY_STEPS] {
    let mut out = [0.0; DENSITY_STEPS];
    let mut delta = DENSITY_DELTA;
    let mut accum = DENSITY_START;
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = accum;
        if i % 10 == 0 {
            delta *= 10.0;
        }
        accum += delta;
    }
    out
}

/// Random operands for `config` at `density`, with every format built
pub fn init_params<'a, R: Rng>(
    arena: &'a Arena,
    config: &SweepConfig,
    density: f64,
    rng: &mut R,
) -> ArenaResult<KernelParams<'a>> {
    let left = random_dense(arena, config.row_count, config.inner_count, density, rng)?;
    let right = random_dense(arena, config.inner_count, config.col_count, density, rng)?;
    KernelParams::new(
        arena,
        MatrixReps::from_dense(arena, left)?,
        MatrixReps::from_dense(arena, right)?,
    )
}

/// Run one wave of `kind` and return its results
pub fn measure<C: TickSource>(
    kind: KernelKind,
    tester: &mut RepetitionTester<C>,
    wave: WaveConfig,
    params: &mut KernelParams<'_>,
) -> Result<TestResults, TrialError> {
    let mut counters = OpCounters::new();
    tester.new_wave(wave);
    while tester.is_testing() {
        run_trial(kind, tester, &mut counters, params);
    }
    tester.finish().copied()
}

/// Run every kernel once and compare it against dense x dense
///
/// Operands live in a scratch region that is rolled back afterwards.
/// Returns the names of kernels that disagree with the reference.
pub fn verify<R: Rng>(
    arena: &mut Arena,
    config: &SweepConfig,
    rng: &mut R,
) -> Result<Vec<&'static str>> {
    let scratch = arena.scratch();
    let mut params = init_params(&scratch, config, VERIFY_DENSITY, rng)
        .context("Failed to allocate verification operands")?;

    let once = WaveConfig::new(config.tick_frequency).with_seconds_to_try(0);
    let mut tester = RepetitionTester::new();

    measure(KernelKind::DenseDense, &mut tester, once, &mut params)?;
    let reference = scratch
        .alloc_copy(&*params.output)
        .context("Failed to allocate reference output")?;

    let mut mismatched = Vec::new();
    for kind in &KernelKind::ALL[1..] {
        tester.reset();
        measure(*kind, &mut tester, once, &mut params)?;

        let mismatch = reference
            .iter()
            .zip(params.output.iter())
            .find(|(expected, actual)| (**expected - **actual).abs() > VERIFY_EPSILON);
        if let Some((expected, actual)) = mismatch {
            error!(
                "Kernel '{}' does not match reference ({}:{})",
                kind.name(),
                expected,
                actual
            );
            mismatched.push(kind.name());
        }
    }

    drop(params);
    scratch.end();

    if mismatched.is_empty() {
        info!("All kernels match reference");
    }
    Ok(mismatched)
}

/// Measure every kernel at every density
///
/// The arena is cleared after each density, so its footprint is bounded by
/// the largest single problem.
pub fn sweep<R: Rng>(
    arena: &mut Arena,
    config: &SweepConfig,
    rng: &mut R,
) -> Result<SweepReport> {
    let started_at = Local::now();
    let mut series: Vec<KernelSeries> = KernelKind::ALL
        .iter()
        .map(|k| KernelSeries::new(*k))
        .collect();

    for density in densities() {
        {
            let mut params = init_params(arena, config, density, rng)
                .with_context(|| format!("Failed to allocate operands at density {density:.4}"))?;

            // Same non-zero pattern in every format, so csr is representative
            let left_non_zero_count = params.left.csr.non_zero_count;
            let right_non_zero_count = params.right.csr.non_zero_count;
            info!(
                "Density {:.4}: left {} non-zeros, right {} non-zeros",
                density, left_non_zero_count, right_non_zero_count
            );

            for entry in &mut series {
                info!("--- {} @ {:.4} density ---", entry.name, density);
                let mut tester = RepetitionTester::new();
                let results = measure(entry.kernel, &mut tester, config.wave(), &mut params)
                    .with_context(|| format!("{} failed at density {density:.4}", entry.name))?;

                entry.rows.push(SweepRow {
                    row_count: config.row_count,
                    col_count: config.col_count,
                    inner_count: config.inner_count,
                    left_non_zero_count,
                    right_non_zero_count,
                    density,
                    flops: results.min.flops(),
                    memops: results.min.memops(),
                    time: results.min.time(),
                    trial_count: results.trial_count,
                });
            }
        }

        arena.log_stats();
        arena.clear();
    }

    Ok(SweepReport {
        started_at,
        tick_frequency: config.tick_frequency,
        seconds_to_try: config.seconds_to_try,
        series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena::ArenaConfig;
    use common::constants::memory::MB;
    use rand::{SeedableRng, rngs::StdRng};

    fn config() -> SweepConfig {
        SweepConfig {
            row_count: 8,
            col_count: 6,
            inner_count: 7,
            seconds_to_try: 0,
            tick_frequency: 0,
        }
    }

    #[test]
    fn test_density_schedule() {
        let d = densities();
        assert!((d[0] - 0.01).abs() < 1e-12);
        assert!((d[1] - 0.02).abs() < 1e-12);
        assert!((d[9] - 0.10).abs() < 1e-9);
        assert!((d[10] - 0.11).abs() < 1e-9);
        assert!((d[11] - 0.21).abs() < 1e-9);
        assert!(d.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_verify_passes_and_rolls_back() {
        let mut arena = Arena::new(ArenaConfig::default().reserve_size(16 * MB)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let mismatched = verify(&mut arena, &config(), &mut rng).unwrap();
        assert!(mismatched.is_empty());
        assert_eq!(arena.pos(), 0);
    }

    #[test]
    fn test_sweep_fills_every_series() {
        let mut arena = Arena::new(ArenaConfig::default().reserve_size(16 * MB)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let report = sweep(&mut arena, &config(), &mut rng).unwrap();
        assert_eq!(arena.pos(), 0);
        assert_eq!(report.series.len(), KernelKind::ALL.len());
        for series in &report.series {
            assert_eq!(series.rows.len(), DENSITY_STEPS);
            assert!(series.rows.iter().all(|row| row.trial_count == 1));
        }

        let dense = &report.series[0].rows[5];
        let (r, i, c) = (8, 7, 6);
        assert_eq!(dense.flops, 2 * r * i * c);
        assert_eq!(dense.memops, 2 * r * i * c + r * c);
    }
}
