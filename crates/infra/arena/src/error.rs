//! Arena error types
//!
//! Every variant is fatal for the allocation that produced it: the arena
//! never hands out a partial allocation and has no fallback strategy.

use crate::os::OsError;
use std::io;
use std::panic::Location;
use std::path::PathBuf;
use thiserror::Error;

/// Arena errors
#[derive(Debug, Error)]
pub enum ArenaError {
    /// Commit size larger than the reservation
    #[error(
        "Reserve size must be greater than or equal to commit size: reserve {reserve} bytes, commit {commit} bytes (arena at {location})"
    )]
    CommitExceedsReserve {
        reserve: usize,
        commit: usize,
        location: &'static Location<'static>,
    },

    /// Buffer-backed flag passed to a self-allocating constructor
    #[error("Buffer-backed arenas must be created with Arena::from_buffer (arena at {location})")]
    MissingBuffer { location: &'static Location<'static> },

    /// Address space reservation failed
    #[error("Failed to allocate arena memory (arena at {location}): {source}")]
    Reserve {
        location: &'static Location<'static>,
        #[source]
        source: OsError,
    },

    /// Allocation would need more than the reserved range
    #[error(
        "Not enough reserved memory in arena, desired: {desired} bytes, reserved: {reserved} bytes (allocation at {location})"
    )]
    OutOfReserve {
        desired: usize,
        reserved: usize,
        location: &'static Location<'static>,
    },

    /// OS refused to commit pages inside the reservation
    #[error("Failed to commit arena memory (allocation at {location}): {source}")]
    Commit {
        location: &'static Location<'static>,
        #[source]
        source: OsError,
    },

    /// Alignment is not a power of two
    #[error("Alignment {align} is not a power of two (allocation at {location})")]
    InvalidAlignment {
        align: usize,
        location: &'static Location<'static>,
    },

    /// Element count times element size overflowed
    #[error(
        "Allocation of {count} elements of {elem_size} bytes overflows (allocation at {location})"
    )]
    SizeOverflow {
        count: usize,
        elem_size: usize,
        location: &'static Location<'static>,
    },

    /// File could not be read into the arena
    #[error("Unable to read file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for arena operations
pub type ArenaResult<T> = Result<T, ArenaError>;
