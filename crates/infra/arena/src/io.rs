//! File loading into arena memory

use crate::arena::Arena;
use crate::error::{ArenaError, ArenaResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::error;

impl Arena {
    /// Read the whole file at `path` into a fresh arena allocation
    ///
    /// If the read fails the allocation is rolled back so the arena cursor
    /// is exactly where it was before the call.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Io`] if the file cannot be opened or fully read,
    /// or any allocation error from [`Arena::alloc_slice`].
    #[track_caller]
    #[allow(clippy::mut_from_ref)]
    pub fn read_file(&self, path: impl AsRef<Path>) -> ArenaResult<&mut [u8]> {
        let path = path.as_ref();
        let io_error = |source| ArenaError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(|e| {
            error!("Unable to open file: {}", path.display());
            io_error(e)
        })?;
        let len = file.metadata().map_err(io_error)?.len();
        let len = usize::try_from(len)
            .map_err(|_| io_error(std::io::Error::other("file larger than address space")))?;

        let checkpoint = self.pos();
        let buffer = self.alloc_slice::<u8>(len)?;

        match file.read_exact(buffer) {
            Ok(()) => Ok(buffer),
            Err(e) => {
                error!("Unable to read file: {}: {}", path.display(), e);
                // SAFETY: `buffer` is the only allocation past the checkpoint
                // and it is not returned
                unsafe { self.rewind(checkpoint) };
                Err(io_error(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::{Arena, ArenaConfig};
    use crate::error::ArenaError;
    use common::constants::memory::{KB, MB};
    use std::io::Write;

    #[test]
    fn test_read_file_into_arena() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"row_count,col_count\n4,4\n").unwrap();

        let arena =
            Arena::new(ArenaConfig::default().reserve_size(MB).commit_size(4 * KB)).unwrap();
        let bytes = arena.read_file(file.path()).unwrap();

        assert_eq!(bytes, b"row_count,col_count\n4,4\n");
        assert_eq!(arena.pos(), bytes.len());
    }

    #[test]
    fn test_missing_file_leaves_arena_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let arena =
            Arena::new(ArenaConfig::default().reserve_size(MB).commit_size(4 * KB)).unwrap();
        arena.alloc(16, 8).unwrap();

        let err = arena.read_file(dir.path().join("missing.csv")).unwrap_err();
        assert!(matches!(err, ArenaError::Io { .. }));
        assert_eq!(arena.pos(), 16);
    }
}
