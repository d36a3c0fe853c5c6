//! Virtual-memory-backed bump allocator
//!
//! An [`Arena`] reserves a large range of address space up front and
//! commits pages lazily as allocations advance its cursor. Memory is handed
//! back in bulk: a [`Scratch`] rolls the cursor back to a checkpoint, and
//! [`Arena::clear`] resets it to zero while keeping the committed pages.
//!
//! Allocation failure is never partial. The arena returns an [`ArenaError`]
//! naming the call site and leaves the decision to abort, report or
//! propagate to the host application.
//!
//! ```no_run
//! use arena::{Arena, ArenaConfig};
//!
//! # fn main() -> Result<(), arena::ArenaError> {
//! let mut arena = Arena::new(ArenaConfig::default())?;
//! let values = arena.alloc_slice::<f64>(1024)?;
//! values[0] = 1.0;
//!
//! let scratch = arena.scratch();
//! let _tmp = scratch.alloc_slice::<u32>(4096)?;
//! scratch.end();
//! # Ok(())
//! # }
//! ```

pub mod arena;
pub mod error;
mod io;
pub mod os;
pub mod scratch;

pub use arena::{Arena, ArenaConfig, ArenaFlags, ArenaStats};
pub use error::{ArenaError, ArenaResult};
pub use os::{OsAllocFlags, OsError, Region, page_size};
pub use scratch::Scratch;
