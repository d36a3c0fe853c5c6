//! Matrix storage formats, allocated in an arena

use arena::{Arena, ArenaResult};
use rand::Rng;

/// Row-major dense matrix
#[derive(Debug, Clone, Copy)]
pub struct DenseMatrix<'a> {
    pub row_count: usize,
    pub col_count: usize,
    pub values: &'a [f64],
}

/// Compressed sparse row matrix
#[derive(Debug, Clone, Copy)]
pub struct CsrMatrix<'a> {
    pub row_count: usize,
    pub col_count: usize,
    pub non_zero_count: usize,
    /// `row_count + 1` offsets into `col_indices` / `values`
    pub row_pointers: &'a [u32],
    pub col_indices: &'a [u32],
    pub values: &'a [f64],
}

/// Compressed sparse column matrix
#[derive(Debug, Clone, Copy)]
pub struct CscMatrix<'a> {
    pub row_count: usize,
    pub col_count: usize,
    pub non_zero_count: usize,
    /// `col_count + 1` offsets into `row_indices` / `values`
    pub col_pointers: &'a [u32],
    pub row_indices: &'a [u32],
    pub values: &'a [f64],
}

/// The same matrix in every format
#[derive(Debug, Clone, Copy)]
pub struct MatrixReps<'a> {
    pub dense: DenseMatrix<'a>,
    pub csr: CsrMatrix<'a>,
    pub csc: CscMatrix<'a>,
}

impl<'a> MatrixReps<'a> {
    /// Convert `dense` into both sparse formats
    pub fn from_dense(arena: &'a Arena, dense: DenseMatrix<'a>) -> ArenaResult<Self> {
        Ok(Self {
            dense,
            csr: csr_from_dense(arena, &dense)?,
            csc: csc_from_dense(arena, &dense)?,
        })
    }
}

impl DenseMatrix<'_> {
    /// Value at `(row, col)`
    #[inline]
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.col_count + col]
    }

    #[must_use]
    pub fn non_zero_count(&self) -> usize {
        self.values.iter().filter(|v| **v != 0.0).count()
    }
}

/// Random matrix where each entry is non-zero with probability `density`
///
/// Non-zero values are uniform in `[-1, 1)`.
pub fn random_dense<'a, R: Rng>(
    arena: &'a Arena,
    row_count: usize,
    col_count: usize,
    density: f64,
    rng: &mut R,
) -> ArenaResult<DenseMatrix<'a>> {
    let values = arena.alloc_slice::<f64>(row_count * col_count)?;
    for value in values.iter_mut() {
        if rng.gen_bool(density.clamp(0.0, 1.0)) {
            *value = rng.gen_range(-1.0..1.0);
        }
    }

    Ok(DenseMatrix {
        row_count,
        col_count,
        values,
    })
}

/// Compress `dense` row by row
pub fn csr_from_dense<'a>(arena: &'a Arena, dense: &DenseMatrix<'_>) -> ArenaResult<CsrMatrix<'a>> {
    let non_zero_count = dense.non_zero_count();
    let values = arena.alloc_slice::<f64>(non_zero_count)?;
    let col_indices = arena.alloc_slice::<u32>(non_zero_count)?;
    let row_pointers = arena.alloc_slice::<u32>(dense.row_count + 1)?;

    let mut next = 0;
    for row in 0..dense.row_count {
        for col in 0..dense.col_count {
            let value = dense.get(row, col);
            if value != 0.0 {
                values[next] = value;
                col_indices[next] = col as u32;
                next += 1;
            }
        }
        row_pointers[row + 1] = next as u32;
    }

    Ok(CsrMatrix {
        row_count: dense.row_count,
        col_count: dense.col_count,
        non_zero_count,
        row_pointers,
        col_indices,
        values,
    })
}

/// Compress `dense` column by column
pub fn csc_from_dense<'a>(arena: &'a Arena, dense: &DenseMatrix<'_>) -> ArenaResult<CscMatrix<'a>> {
    let non_zero_count = dense.non_zero_count();
    let values = arena.alloc_slice::<f64>(non_zero_count)?;
    let row_indices = arena.alloc_slice::<u32>(non_zero_count)?;
    let col_pointers = arena.alloc_slice::<u32>(dense.col_count + 1)?;

    let mut next = 0;
    for col in 0..dense.col_count {
        for row in 0..dense.row_count {
            let value = dense.get(row, col);
            if value != 0.0 {
                values[next] = value;
                row_indices[next] = row as u32;
                next += 1;
            }
        }
        col_pointers[col + 1] = next as u32;
    }

    Ok(CscMatrix {
        row_count: dense.row_count,
        col_count: dense.col_count,
        non_zero_count,
        col_pointers,
        row_indices,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena::ArenaConfig;
    use common::constants::memory::MB;
    use rand::{SeedableRng, rngs::StdRng};

    fn test_arena() -> Arena {
        Arena::new(ArenaConfig::default().reserve_size(16 * MB)).unwrap()
    }

    //  1 0 2
    //  0 0 3
    fn sample(arena: &Arena) -> DenseMatrix<'_> {
        let values = arena.alloc_copy(&[1.0, 0.0, 2.0, 0.0, 0.0, 3.0]).unwrap();
        DenseMatrix {
            row_count: 2,
            col_count: 3,
            values,
        }
    }

    #[test]
    fn test_csr_layout() {
        let arena = test_arena();
        let csr = csr_from_dense(&arena, &sample(&arena)).unwrap();

        assert_eq!(csr.non_zero_count, 3);
        assert_eq!(csr.row_pointers, &[0, 2, 3]);
        assert_eq!(csr.col_indices, &[0, 2, 2]);
        assert_eq!(csr.values, &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_csc_layout() {
        let arena = test_arena();
        let csc = csc_from_dense(&arena, &sample(&arena)).unwrap();

        assert_eq!(csc.non_zero_count, 3);
        assert_eq!(csc.col_pointers, &[0, 1, 1, 3]);
        assert_eq!(csc.row_indices, &[0, 0, 1]);
        assert_eq!(csc.values, &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_random_density_extremes() {
        let arena = test_arena();
        let mut rng = StdRng::seed_from_u64(7);

        let empty = random_dense(&arena, 8, 8, 0.0, &mut rng).unwrap();
        assert_eq!(empty.non_zero_count(), 0);

        let full = random_dense(&arena, 8, 8, 1.5, &mut rng).unwrap();
        assert!(full.values.iter().all(|v| (-1.0..1.0).contains(v)));
        // gen_range can return exactly 0.0, so allow a stray zero
        assert!(full.non_zero_count() >= 63);
    }

    #[test]
    fn test_random_is_seeded() {
        let arena = test_arena();
        let a = random_dense(&arena, 4, 4, 0.5, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = random_dense(&arena, 4, 4, 0.5, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(a.values, b.values);
    }
}
