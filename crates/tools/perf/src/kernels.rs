//! Matrix multiply kernels under the repetition tester
//!
//! Every kernel computes `output = left * right` into a row-major dense
//! output, timing only the multiply itself. Loads, stores and fused
//! multiply-adds are reported through the [`OpCounter`] handed in.

use crate::formats::MatrixReps;
use arena::{Arena, ArenaResult};
use reptest::{OpCounter, OpCounters, RepetitionTester, TickSource};
use serde::Serialize;

const F64_BYTES: u64 = size_of::<f64>() as u64;

/// Operands and output buffer shared by every kernel
#[derive(Debug)]
pub struct KernelParams<'a> {
    pub left: MatrixReps<'a>,
    pub right: MatrixReps<'a>,
    pub output: &'a mut [f64],
}

impl<'a> KernelParams<'a> {
    /// Pair two operands with a zeroed output of matching shape
    pub fn new(arena: &'a Arena, left: MatrixReps<'a>, right: MatrixReps<'a>) -> ArenaResult<Self> {
        debug_assert_eq!(left.csr.col_count, right.csc.row_count, "inner dimensions differ");
        let output = arena.alloc_slice::<f64>(left.dense.row_count * right.dense.col_count)?;
        Ok(Self {
            left,
            right,
            output,
        })
    }

    /// Output column count
    #[must_use]
    pub const fn output_cols(&self) -> usize {
        self.right.dense.col_count
    }
}

/// Kernel selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KernelKind {
    DenseDense,
    CsrDense,
    CscDense,
    CsrCsr,
    CscCsc,
}

impl KernelKind {
    /// Every kernel, reference first
    pub const ALL: [Self; 5] = [
        Self::DenseDense,
        Self::CsrDense,
        Self::CscDense,
        Self::CsrCsr,
        Self::CscCsc,
    ];

    /// Name used for output files
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DenseDense => "dense_X_dense",
            Self::CsrDense => "csr_X_dense",
            Self::CscDense => "csc_X_dense",
            Self::CsrCsr => "csr_X_csr",
            Self::CscCsc => "csc_X_csc",
        }
    }

    /// Run the kernel once inside a timing bracket and report its bytes
    pub fn run<C: TickSource, O: OpCounter>(
        self,
        tester: &mut RepetitionTester<C>,
        counter: &mut O,
        params: &mut KernelParams<'_>,
    ) {
        match self {
            Self::DenseDense => matmul_dense_dense(tester, counter, params),
            Self::CsrDense => matmul_csr_dense(tester, counter, params),
            Self::CscDense => matmul_csc_dense(tester, counter, params),
            Self::CsrCsr => matmul_csr_csr(tester, counter, params),
            Self::CscCsc => matmul_csc_csc(tester, counter, params),
        }
    }
}

/// One full trial: clear the output, run the kernel, report op counts
pub fn run_trial<C: TickSource>(
    kind: KernelKind,
    tester: &mut RepetitionTester<C>,
    counters: &mut OpCounters,
    params: &mut KernelParams<'_>,
) {
    params.output.fill(0.0);
    counters.reset();
    kind.run(tester, counters, params);
    tester.count_ops(counters);
}

fn matmul_dense_dense<C: TickSource, O: OpCounter>(
    tester: &mut RepetitionTester<C>,
    counter: &mut O,
    params: &mut KernelParams<'_>,
) {
    let left = params.left.dense;
    let right = params.right.dense;
    let out_cols = params.output_cols();
    let output = &mut *params.output;

    tester.begin_time();

    for row in 0..left.row_count {
        for col in 0..right.col_count {
            let mut dot = 0.0;
            for i in 0..left.col_count {
                let left_value = left.values[row * left.col_count + i];
                counter.load();
                let right_value = right.values[i * right.col_count + col];
                counter.load();

                dot += left_value * right_value;
                counter.fmadd();
            }
            output[row * out_cols + col] = dot;
            counter.store();
        }
    }

    tester.close_time();
    tester.count_bytes((output.len() as u64) * F64_BYTES);
}

fn matmul_csr_dense<C: TickSource, O: OpCounter>(
    tester: &mut RepetitionTester<C>,
    counter: &mut O,
    params: &mut KernelParams<'_>,
) {
    let left = params.left.csr;
    let right = params.right.dense;
    let out_cols = params.output_cols();
    let output = &mut *params.output;

    tester.begin_time();

    for row in 0..left.row_count {
        let start = left.row_pointers[row] as usize;
        counter.load();
        let end = left.row_pointers[row + 1] as usize;
        counter.load();

        for i in start..end {
            let left_col = left.col_indices[i] as usize;
            counter.load();
            let left_value = left.values[i];
            counter.load();

            for right_col in 0..right.col_count {
                let right_value = right.values[left_col * right.col_count + right_col];
                counter.load();
                let slot = &mut output[row * out_cols + right_col];
                counter.load();
                *slot += left_value * right_value;
                counter.fmadd();
                counter.store();
            }
        }
    }

    tester.close_time();
    tester.count_bytes((left.non_zero_count * right.col_count) as u64 * F64_BYTES);
}

fn matmul_csc_dense<C: TickSource, O: OpCounter>(
    tester: &mut RepetitionTester<C>,
    counter: &mut O,
    params: &mut KernelParams<'_>,
) {
    let left = params.left.csc;
    let right = params.right.dense;
    let out_cols = params.output_cols();
    let output = &mut *params.output;

    tester.begin_time();

    for col in 0..left.col_count {
        let start = left.col_pointers[col] as usize;
        counter.load();
        let end = left.col_pointers[col + 1] as usize;
        counter.load();

        for i in start..end {
            let left_row = left.row_indices[i] as usize;
            counter.load();
            let left_value = left.values[i];
            counter.load();

            for right_col in 0..right.col_count {
                let right_value = right.values[col * right.col_count + right_col];
                counter.load();
                let slot = &mut output[left_row * out_cols + right_col];
                counter.load();
                *slot += left_value * right_value;
                counter.fmadd();
                counter.store();
            }
        }
    }

    tester.close_time();
    tester.count_bytes((left.non_zero_count * right.col_count) as u64 * F64_BYTES);
}

/// Bytes touched by the sparse-sparse kernels, estimated from the average
/// number of non-zeros per row of `right`
fn sparse_sparse_bytes(params: &KernelParams<'_>) -> u64 {
    let cols = params.right.dense.col_count.max(1);
    (params.left.csr.non_zero_count * params.right.csr.non_zero_count / cols) as u64 * F64_BYTES
}

fn matmul_csr_csr<C: TickSource, O: OpCounter>(
    tester: &mut RepetitionTester<C>,
    counter: &mut O,
    params: &mut KernelParams<'_>,
) {
    let left = params.left.csr;
    let right = params.right.csr;
    let out_cols = params.output_cols();
    let bytes = sparse_sparse_bytes(params);
    let output = &mut *params.output;

    tester.begin_time();

    for left_row in 0..left.row_count {
        let left_start = left.row_pointers[left_row] as usize;
        counter.load();
        let left_end = left.row_pointers[left_row + 1] as usize;
        counter.load();

        for i in left_start..left_end {
            let left_col = left.col_indices[i] as usize;
            counter.load();
            let left_value = left.values[i];
            counter.load();

            let right_start = right.row_pointers[left_col] as usize;
            counter.load();
            let right_end = right.row_pointers[left_col + 1] as usize;
            counter.load();

            for j in right_start..right_end {
                let right_col = right.col_indices[j] as usize;
                counter.load();
                let right_value = right.values[j];
                counter.load();

                let slot = &mut output[left_row * out_cols + right_col];
                counter.load();
                *slot += left_value * right_value;
                counter.fmadd();
                counter.store();
            }
        }
    }

    tester.close_time();
    tester.count_bytes(bytes);
}

fn matmul_csc_csc<C: TickSource, O: OpCounter>(
    tester: &mut RepetitionTester<C>,
    counter: &mut O,
    params: &mut KernelParams<'_>,
) {
    let left = params.left.csc;
    let right = params.right.csc;
    let out_cols = params.output_cols();
    let bytes = sparse_sparse_bytes(params);
    let output = &mut *params.output;

    tester.begin_time();

    for right_col in 0..right.col_count {
        let right_start = right.col_pointers[right_col] as usize;
        counter.load();
        let right_end = right.col_pointers[right_col + 1] as usize;
        counter.load();

        for i in right_start..right_end {
            let right_row = right.row_indices[i] as usize;
            counter.load();
            let right_value = right.values[i];
            counter.load();

            let left_start = left.col_pointers[right_row] as usize;
            counter.load();
            let left_end = left.col_pointers[right_row + 1] as usize;
            counter.load();

            for j in left_start..left_end {
                let left_row = left.row_indices[j] as usize;
                counter.load();
                let left_value = left.values[j];
                counter.load();

                let slot = &mut output[left_row * out_cols + right_col];
                counter.load();
                *slot += left_value * right_value;
                counter.fmadd();
                counter.store();
            }
        }
    }

    tester.close_time();
    tester.count_bytes(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::random_dense;
    use arena::ArenaConfig;
    use common::constants::memory::MB;
    use rand::{SeedableRng, rngs::StdRng};
    use reptest::{ManualClock, NoCount, WaveConfig};
    use rstest::rstest;

    const ROWS: usize = 6;
    const INNER: usize = 5;
    const COLS: usize = 4;

    fn params(arena: &Arena, density: f64) -> KernelParams<'_> {
        let mut rng = StdRng::seed_from_u64(99);
        let left = random_dense(arena, ROWS, INNER, density, &mut rng).unwrap();
        let right = random_dense(arena, INNER, COLS, density, &mut rng).unwrap();
        KernelParams::new(
            arena,
            MatrixReps::from_dense(arena, left).unwrap(),
            MatrixReps::from_dense(arena, right).unwrap(),
        )
        .unwrap()
    }

    fn once(kind: KernelKind, params: &mut KernelParams<'_>) -> OpCounters {
        let clock = ManualClock::new();
        let mut tester = RepetitionTester::with_clock(clock);
        let mut counters = OpCounters::new();
        tester.new_wave(WaveConfig::new(0).with_seconds_to_try(0));
        while tester.is_testing() {
            run_trial(kind, &mut tester, &mut counters, params);
        }
        assert!(tester.finish().is_ok());
        counters
    }

    #[rstest]
    #[case(KernelKind::CsrDense)]
    #[case(KernelKind::CscDense)]
    #[case(KernelKind::CsrCsr)]
    #[case(KernelKind::CscCsc)]
    fn test_kernel_matches_dense(#[case] kind: KernelKind, #[values(0.0, 0.3, 1.0)] density: f64) {
        let arena = Arena::new(ArenaConfig::default().reserve_size(4 * MB)).unwrap();
        let mut params = params(&arena, density);

        once(KernelKind::DenseDense, &mut params);
        let reference = params.output.to_vec();

        once(kind, &mut params);
        for (expected, actual) in reference.iter().zip(params.output.iter()) {
            assert!((expected - actual).abs() <= 1e-9, "{} differs", kind.name());
        }
    }

    #[rstest]
    fn test_dense_counts() {
        let arena = Arena::new(ArenaConfig::default().reserve_size(4 * MB)).unwrap();
        let mut params = params(&arena, 0.5);

        let counters = once(KernelKind::DenseDense, &mut params);
        let (r, i, c) = (ROWS as u64, INNER as u64, COLS as u64);
        assert_eq!(counters.flops, 2 * r * i * c);
        assert_eq!(counters.memops, 2 * r * i * c + r * c);
    }

    #[rstest]
    fn test_csr_dense_counts() {
        let arena = Arena::new(ArenaConfig::default().reserve_size(4 * MB)).unwrap();
        let mut params = params(&arena, 0.5);
        let nnz = params.left.csr.non_zero_count as u64;

        let counters = once(KernelKind::CsrDense, &mut params);
        let (r, c) = (ROWS as u64, COLS as u64);
        assert_eq!(counters.flops, 2 * nnz * c);
        assert_eq!(counters.memops, 2 * r + 2 * nnz + 3 * nnz * c);
    }

    #[rstest]
    fn test_no_count_still_computes() {
        let arena = Arena::new(ArenaConfig::default().reserve_size(4 * MB)).unwrap();
        let mut params = params(&arena, 1.0);
        let mut tester = RepetitionTester::with_clock(ManualClock::new());
        tester.new_wave(WaveConfig::new(0).with_seconds_to_try(0));

        assert!(tester.is_testing());
        KernelKind::DenseDense.run(&mut tester, &mut NoCount, &mut params);
        assert!(!tester.is_testing());

        assert!(tester.finish().is_ok());
        assert_eq!(
            tester.results().min.bytes(),
            (ROWS * COLS) as u64 * F64_BYTES
        );
    }
}
