//! Virtual-memory bump allocator
//!
//! COMPLIANCE:
//! - One reservation per arena, committed lazily in whole pages
//! - No partial allocations: an allocation either fits or fails
//! - Returned memory is always zero-filled by the arena
//! - Fast reset for reuse between problem sizes

use crate::error::{ArenaError, ArenaResult};
use crate::os::{OsAllocFlags, Region, round_to_pages};
use common::constants::arena::{DEFAULT_COMMIT_SIZE, DEFAULT_RESERVE_SIZE};
use common::{align_up, is_power_of_two};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::mem::{align_of, size_of};
use std::panic::Location;
use std::ptr::{self, NonNull};
use std::slice;
use tracing::{debug, info};
use zerocopy::FromZeros;

/// Arena ownership flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArenaFlags(u32);

impl ArenaFlags {
    /// Arena owns its reservation
    pub const NONE: Self = Self(0);
    /// Arena runs over a caller-provided buffer and never frees it
    pub const BUFFER_BACKED: Self = Self(1 << 0);

    /// Check whether all bits of `other` are set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

/// Arena configuration
///
/// Defaults: 256 MiB reserved, 64 KiB committed up front, no flags.
/// Both sizes are rounded up to the page size before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Address space reserved for the arena (bytes)
    pub reserve_size: usize,
    /// Memory committed at construction (bytes)
    pub commit_size: usize,
    /// Ownership flags
    pub flags: ArenaFlags,
    /// Flags forwarded to the OS reservation
    pub os_flags: OsAllocFlags,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            reserve_size: DEFAULT_RESERVE_SIZE,
            commit_size: DEFAULT_COMMIT_SIZE,
            flags: ArenaFlags::NONE,
            os_flags: OsAllocFlags::NONE,
        }
    }
}

impl ArenaConfig {
    /// Set the reservation size
    #[must_use]
    pub const fn reserve_size(mut self, bytes: usize) -> Self {
        self.reserve_size = bytes;
        self
    }

    /// Set the initial commit size
    #[must_use]
    pub const fn commit_size(mut self, bytes: usize) -> Self {
        self.commit_size = bytes;
        self
    }

    /// Set ownership flags
    #[must_use]
    pub const fn flags(mut self, flags: ArenaFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set OS reservation flags (huge pages, prefault)
    #[must_use]
    pub const fn os_flags(mut self, flags: OsAllocFlags) -> Self {
        self.os_flags = flags;
        self
    }
}

/// Arena statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub reserved: usize,
    pub committed: usize,
    pub used: usize,
}

/// Bump allocator over a reserved virtual address range
///
/// Allocation only needs `&self`, so several live allocations can coexist.
/// Anything that moves the cursor backward (`pop`, `pop_to`, `clear`)
/// needs `&mut self`, which guarantees no allocation outlives the rollback.
///
/// The arena is `!Sync`; use one arena per thread.
pub struct Arena {
    base: NonNull<u8>,
    reserved: usize,
    committed: Cell<usize>,
    next_offset: Cell<usize>,
    initial_commit: usize,
    // None when buffer-backed
    region: RefCell<Option<Region>>,
    flags: ArenaFlags,
    created_at: &'static Location<'static>,
}

impl Arena {
    /// Reserve and commit memory for a new arena
    ///
    /// # Errors
    ///
    /// Fails if the reserve size is smaller than the commit size, if the
    /// config asks for a buffer-backed arena, or if the OS refuses the
    /// reservation.
    #[track_caller]
    pub fn new(config: ArenaConfig) -> ArenaResult<Self> {
        let location = Location::caller();

        if config.flags.contains(ArenaFlags::BUFFER_BACKED) {
            return Err(ArenaError::MissingBuffer { location });
        }

        let granularity = config.os_flags.granularity();
        let reserve = round_to_pages(config.reserve_size, granularity)
            .map_err(|source| ArenaError::Reserve { location, source })?;
        let commit = round_to_pages(config.commit_size, granularity)
            .map_err(|source| ArenaError::Reserve { location, source })?;

        if reserve < commit {
            return Err(ArenaError::CommitExceedsReserve {
                reserve,
                commit,
                location,
            });
        }

        let mut region = Region::reserve(reserve, config.os_flags)
            .map_err(|source| ArenaError::Reserve { location, source })?;
        if region.committed() < commit {
            region
                .commit(commit - region.committed())
                .map_err(|source| ArenaError::Commit { location, source })?;
        }

        debug!(
            "Arena created at {}: reserved {} bytes, committed {} bytes",
            location,
            region.reserved(),
            region.committed()
        );

        Ok(Self {
            base: region.base(),
            reserved: region.reserved(),
            committed: Cell::new(region.committed()),
            next_offset: Cell::new(0),
            initial_commit: region.committed(),
            region: RefCell::new(Some(region)),
            flags: config.flags,
            created_at: location,
        })
    }

    /// Arena with the default configuration
    ///
    /// # Errors
    ///
    /// See [`Arena::new`].
    #[track_caller]
    pub fn with_defaults() -> ArenaResult<Self> {
        Self::new(ArenaConfig::default())
    }

    /// Build an arena over caller-owned memory
    ///
    /// The whole buffer counts as committed; the arena never grows past it
    /// and never frees it.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `len` bytes for as long
    /// as the arena (and anything allocated from it) is alive, and nothing
    /// else may access that memory in the meantime.
    #[track_caller]
    #[must_use]
    pub unsafe fn from_buffer(base: NonNull<u8>, len: usize) -> Self {
        Self {
            base,
            reserved: len,
            committed: Cell::new(len),
            next_offset: Cell::new(0),
            initial_commit: len,
            region: RefCell::new(None),
            flags: ArenaFlags::BUFFER_BACKED,
            created_at: Location::caller(),
        }
    }

    /// Allocate `size` zeroed bytes aligned to `align`
    ///
    /// Commits more pages when needed. Never returns a partial allocation.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::InvalidAlignment`] if `align` is not a power of
    /// two and [`ArenaError::OutOfReserve`] if the allocation does not fit in
    /// the reserved range. Both name the calling site.
    #[track_caller]
    #[inline]
    pub fn alloc(&self, size: usize, align: usize) -> ArenaResult<NonNull<u8>> {
        let location = Location::caller();
        if !is_power_of_two(align) {
            return Err(ArenaError::InvalidAlignment { align, location });
        }

        let offset = self.next_offset.get();
        let out_of_reserve = || ArenaError::OutOfReserve {
            desired: usize::MAX,
            reserved: self.reserved,
            location,
        };

        // Align the address, not the offset: buffer-backed bases are arbitrary
        let base_addr = self.base.as_ptr() as usize;
        let aligned = base_addr
            .checked_add(offset)
            .and_then(|addr| align_up(addr, align))
            .map(|addr| addr - base_addr)
            .ok_or_else(out_of_reserve)?;
        let end = aligned.checked_add(size).ok_or_else(out_of_reserve)?;

        if end > self.committed.get() {
            self.grow(end, location)?;
        }

        // SAFETY: [aligned, end) is committed and not handed out to anyone else
        unsafe {
            let ptr = self.base.as_ptr().add(aligned);
            ptr::write_bytes(ptr, 0, size);
            self.next_offset.set(end);
            Ok(NonNull::new_unchecked(ptr))
        }
    }

    /// Allocate a zeroed slice of `count` elements
    ///
    /// # Errors
    ///
    /// See [`Arena::alloc`]; also fails if `count * size_of::<T>()` overflows.
    #[track_caller]
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice<T: FromZeros>(&self, count: usize) -> ArenaResult<&mut [T]> {
        let size = size_of::<T>()
            .checked_mul(count)
            .ok_or_else(|| ArenaError::SizeOverflow {
                count,
                elem_size: size_of::<T>(),
                location: Location::caller(),
            })?;
        let ptr = self.alloc(size, align_of::<T>())?;

        // SAFETY: memory is aligned, zeroed (a valid T by FromZeros) and exclusive
        Ok(unsafe { slice::from_raw_parts_mut(ptr.as_ptr().cast::<T>(), count) })
    }

    /// Allocate a single zeroed value
    ///
    /// # Errors
    ///
    /// See [`Arena::alloc`].
    #[track_caller]
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_value<T: FromZeros>(&self) -> ArenaResult<&mut T> {
        let ptr = self.alloc(size_of::<T>(), align_of::<T>())?;

        // SAFETY: see alloc_slice
        Ok(unsafe { &mut *ptr.as_ptr().cast::<T>() })
    }

    /// Copy `src` into the arena
    ///
    /// # Errors
    ///
    /// See [`Arena::alloc_slice`].
    #[track_caller]
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_copy<T: FromZeros + Copy>(&self, src: &[T]) -> ArenaResult<&mut [T]> {
        let dst = self.alloc_slice::<T>(src.len())?;
        dst.copy_from_slice(src);
        Ok(dst)
    }

    fn grow(&self, end: usize, location: &'static Location<'static>) -> ArenaResult<()> {
        let mut region = self.region.borrow_mut();
        let Some(region) = region.as_mut() else {
            return Err(ArenaError::OutOfReserve {
                desired: end,
                reserved: self.reserved,
                location,
            });
        };

        let desired = round_to_pages(end, region.granularity())
            .map_err(|source| ArenaError::Commit { location, source })?;
        if desired > self.reserved {
            return Err(ArenaError::OutOfReserve {
                desired,
                reserved: self.reserved,
                location,
            });
        }

        region
            .commit(desired - self.committed.get())
            .map_err(|source| ArenaError::Commit { location, source })?;
        self.committed.set(region.committed());

        debug!(
            "Arena ({}) grew commit to {} of {} bytes for allocation at {}",
            self.created_at,
            region.committed(),
            self.reserved,
            location
        );
        Ok(())
    }

    /// Move the cursor back to `offset`
    ///
    /// Popping forward is a caller bug: rejected in debug builds, clamped to
    /// a no-op in release builds.
    #[inline]
    pub fn pop_to(&mut self, offset: usize) {
        let current = self.next_offset.get();
        debug_assert!(
            offset <= current,
            "Failed to pop arena allocation, offset {offset} is past the cursor {current}"
        );
        self.next_offset.set(offset.min(current));
    }

    /// Release the last `size` bytes
    ///
    /// Popping more than is allocated is rejected in debug builds and stops
    /// at zero in release builds.
    #[inline]
    pub fn pop(&mut self, size: usize) {
        let current = self.next_offset.get();
        debug_assert!(
            size <= current,
            "Failed to pop arena allocation, {size} bytes is more than currently allocated ({current})"
        );
        self.pop_to(current.saturating_sub(size));
    }

    /// Rewind without an exclusive borrow
    ///
    /// # Safety
    ///
    /// No reference into `[offset, cursor)` may be alive or used afterwards.
    pub(crate) unsafe fn rewind(&self, offset: usize) {
        debug_assert!(offset <= self.next_offset.get());
        self.next_offset.set(offset.min(self.next_offset.get()));
    }

    /// Reset the cursor to zero, keeping committed pages for reuse
    #[inline]
    pub fn clear(&mut self) {
        self.next_offset.set(0);
    }

    /// Return committed pages above the cursor to the OS
    ///
    /// The initial commit is always kept. Buffer-backed arenas keep
    /// everything. Returns the number of bytes decommitted.
    pub fn decommit_unused(&mut self) -> usize {
        let keep = self.next_offset.get().max(self.initial_commit);
        let mut region = self.region.borrow_mut();
        let Some(region) = region.as_mut() else {
            return 0;
        };

        let released = region.decommit(keep);
        self.committed.set(region.committed());
        if released > 0 {
            debug!("Arena ({}) decommitted {} bytes", self.created_at, released);
        }
        released
    }

    /// Release the reservation
    ///
    /// Buffer-backed arenas only drop their bookkeeping; the caller still
    /// owns the buffer.
    pub fn free(self) {
        debug!(
            "Freeing arena created at {} ({} bytes reserved, buffer-backed: {})",
            self.created_at,
            self.reserved,
            self.is_buffer_backed()
        );
        drop(self);
    }

    /// Current cursor
    #[inline]
    #[must_use]
    pub fn pos(&self) -> usize {
        self.next_offset.get()
    }

    /// Reserved bytes
    #[must_use]
    pub const fn reserved(&self) -> usize {
        self.reserved
    }

    /// Committed bytes
    #[must_use]
    pub fn committed(&self) -> usize {
        self.committed.get()
    }

    /// Start of the arena's memory
    #[must_use]
    pub const fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Ownership flags
    #[must_use]
    pub const fn flags(&self) -> ArenaFlags {
        self.flags
    }

    /// Whether the arena runs over caller memory
    #[must_use]
    pub const fn is_buffer_backed(&self) -> bool {
        self.flags.contains(ArenaFlags::BUFFER_BACKED)
    }

    /// Call site that created the arena
    #[must_use]
    pub const fn created_at(&self) -> &'static Location<'static> {
        self.created_at
    }

    /// Memory statistics
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            reserved: self.reserved,
            committed: self.committed.get(),
            used: self.next_offset.get(),
        }
    }

    /// Log memory statistics at `info`
    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            "Arena ({}): reserved {} bytes, committed {} bytes, used {} bytes",
            self.created_at, stats.reserved, stats.committed, stats.used
        );
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("base", &self.base)
            .field("reserved", &self.reserved)
            .field("committed", &self.committed.get())
            .field("next_offset", &self.next_offset.get())
            .field("flags", &self.flags)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os::page_size;
    use common::constants::memory::{KB, MB};

    fn small_arena() -> Arena {
        Arena::new(ArenaConfig::default().reserve_size(MB).commit_size(4 * KB)).unwrap()
    }

    #[test]
    fn test_arena_basic() {
        let arena = small_arena();

        let a = arena.alloc_value::<u64>().unwrap();
        *a = 42;
        let b = arena.alloc_slice::<u32>(4).unwrap();
        b[3] = 7;

        assert_eq!(*a, 42);
        assert_eq!(b, &[0, 0, 0, 7]);
        assert_eq!(arena.pos(), 8 + 16);
    }

    #[test]
    fn test_arena_alignment() {
        let arena = small_arena();
        let _byte = arena.alloc(1, 1).unwrap();
        let ptr = arena.alloc(8, 64).unwrap();

        assert_eq!(ptr.as_ptr() as usize % 64, 0);
        assert_eq!(arena.pos(), 72);
    }

    #[test]
    fn test_invalid_alignment_rejected() {
        let arena = small_arena();
        let err = arena.alloc(8, 12).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidAlignment { align: 12, .. }));
        assert_eq!(arena.pos(), 0);
    }

    #[test]
    fn test_reserve_smaller_than_commit() {
        let err =
            Arena::new(ArenaConfig::default().reserve_size(4 * KB).commit_size(MB)).unwrap_err();
        assert!(matches!(err, ArenaError::CommitExceedsReserve { .. }));
    }

    #[test]
    fn test_buffer_backed_flag_needs_buffer() {
        let err = Arena::new(ArenaConfig::default().flags(ArenaFlags::BUFFER_BACKED)).unwrap_err();
        assert!(matches!(err, ArenaError::MissingBuffer { .. }));
    }

    #[test]
    fn test_grow_commits_whole_pages() {
        let arena = small_arena();
        arena.alloc(8000, 8).unwrap();
        assert_eq!(arena.committed(), align_up(8000, page_size()).unwrap());
    }

    #[test]
    fn test_pop_and_clear() {
        let mut arena = small_arena();
        arena.alloc(100, 1).unwrap();
        arena.alloc(28, 1).unwrap();

        arena.pop(28);
        assert_eq!(arena.pos(), 100);

        arena.pop_to(10);
        assert_eq!(arena.pos(), 10);

        arena.clear();
        assert_eq!(arena.pos(), 0);
    }

    #[test]
    fn test_decommit_unused_keeps_initial_commit() {
        let mut arena = small_arena();
        arena.alloc(64 * KB, 8).unwrap();
        let grown = arena.committed();

        arena.clear();
        let released = arena.decommit_unused();

        assert_eq!(released, grown - arena.committed());
        assert_eq!(arena.committed(), align_up(4 * KB, page_size()).unwrap());

        // Still usable after decommit
        let bytes = arena.alloc_slice::<u8>(32 * KB).unwrap();
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_debug_output_names_call_site() {
        let arena = small_arena();
        let text = format!("{arena:?}");
        assert!(text.contains("arena.rs"));
    }
}
