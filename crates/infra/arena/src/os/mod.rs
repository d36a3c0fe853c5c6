//! OS memory provider
//!
//! Reserves address space without backing it, commits pages on demand and
//! hands everything back to the OS when the [`Region`] is dropped.
//!
//! All sizes are rounded up to the page size before any OS call. A failed
//! call leaves the region exactly as it was.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as sys;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as sys;

use common::align_up;
use common::constants::memory::{HUGE_PAGE_1GB, HUGE_PAGE_2MB};
use serde::{Deserialize, Serialize};
use std::io;
use std::ops::BitOr;
use std::ptr::NonNull;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, trace};

/// Flags controlling how address space is reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OsAllocFlags(u32);

impl OsAllocFlags {
    /// Reserve only; no physical pages
    pub const NONE: Self = Self(0);
    /// Back the whole range with read/write pages immediately
    pub const COMMIT: Self = Self(1 << 0);
    /// Use 2 MiB huge pages (Linux only)
    pub const HUGE_2MB: Self = Self(1 << 1);
    /// Use 1 GiB huge pages (Linux only)
    pub const HUGE_1GB: Self = Self(1 << 2);
    /// Pre-fault committed pages (Linux only)
    pub const PREFAULT: Self = Self(1 << 3);

    /// Check whether all bits of `other` are set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Page granularity implied by the flags
    #[must_use]
    pub fn granularity(self) -> usize {
        if self.contains(Self::HUGE_2MB) {
            HUGE_PAGE_2MB
        } else if self.contains(Self::HUGE_1GB) {
            HUGE_PAGE_1GB
        } else {
            page_size()
        }
    }
}

impl BitOr for OsAllocFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// OS memory errors
#[derive(Debug, Error)]
pub enum OsError {
    /// Address space could not be reserved
    #[error("Failed to reserve {size} bytes of address space: {source}")]
    Reserve {
        size: usize,
        #[source]
        source: io::Error,
    },

    /// Reserved pages could not be made accessible
    #[error("Failed to commit {size} bytes at offset {offset}: {source}")]
    Commit {
        offset: usize,
        size: usize,
        #[source]
        source: io::Error,
    },

    /// Commit would run past the end of the reservation
    #[error("Commit of {requested} bytes exceeds reservation of {reserved} bytes")]
    ExceedsReservation { requested: usize, reserved: usize },

    /// Size overflowed while rounding to the page size
    #[error("Size {size} overflows when rounded to page size {page_size}")]
    SizeOverflow { size: usize, page_size: usize },

    /// Huge pages and pre-faulting are only wired up for Linux
    #[error("Allocation flags {flags:?} are not supported on this platform")]
    Unsupported { flags: OsAllocFlags },
}

/// Page size of the current system, queried once per process
#[must_use]
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(sys::page_size)
}

/// Round `size` up to a multiple of `granularity`
///
/// # Errors
///
/// Returns [`OsError::SizeOverflow`] if the rounded size does not fit a `usize`.
pub fn round_to_pages(size: usize, granularity: usize) -> Result<usize, OsError> {
    align_up(size, granularity).ok_or(OsError::SizeOverflow {
        size,
        page_size: granularity,
    })
}

/// A reserved virtual address range with a committed prefix
///
/// Invariant: `committed <= reserved`, both multiples of `granularity`.
#[derive(Debug)]
pub struct Region {
    base: NonNull<u8>,
    reserved: usize,
    committed: usize,
    granularity: usize,
}

impl Region {
    /// Reserve `size` bytes of address space
    ///
    /// Nothing is backed by physical memory unless [`OsAllocFlags::COMMIT`]
    /// is set, in which case the whole range starts out committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the size overflows or the OS refuses the mapping.
    pub fn reserve(size: usize, flags: OsAllocFlags) -> Result<Self, OsError> {
        let granularity = flags.granularity();
        let reserved = round_to_pages(size.max(1), granularity)?;

        let base = sys::reserve(reserved, flags)?;
        let committed = if flags.contains(OsAllocFlags::COMMIT) {
            reserved
        } else {
            0
        };

        debug!(
            "Reserved {} bytes at {:p} (granularity {}, committed {})",
            reserved, base, granularity, committed
        );

        Ok(Self {
            base,
            reserved,
            committed,
            granularity,
        })
    }

    /// Start of the range
    #[must_use]
    pub const fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Reserved bytes
    #[must_use]
    pub const fn reserved(&self) -> usize {
        self.reserved
    }

    /// Committed bytes (always a prefix of the range)
    #[must_use]
    pub const fn committed(&self) -> usize {
        self.committed
    }

    /// Page granularity used for rounding
    #[must_use]
    pub const fn granularity(&self) -> usize {
        self.granularity
    }

    /// Commit `extra` more bytes after the committed prefix
    ///
    /// # Errors
    ///
    /// Returns [`OsError::ExceedsReservation`] if the commit would pass the
    /// end of the range, or [`OsError::Commit`] if the OS call fails. The
    /// committed size is unchanged on error.
    pub fn commit(&mut self, extra: usize) -> Result<(), OsError> {
        if extra == 0 {
            return Ok(());
        }

        let extra = round_to_pages(extra, self.granularity)?;
        let requested = self
            .committed
            .checked_add(extra)
            .ok_or(OsError::SizeOverflow {
                size: extra,
                page_size: self.granularity,
            })?;

        if requested > self.reserved {
            return Err(OsError::ExceedsReservation {
                requested,
                reserved: self.reserved,
            });
        }

        // SAFETY: [committed, committed + extra) lies inside the reservation
        unsafe {
            let start = self.base.as_ptr().add(self.committed);
            sys::commit(start, extra).map_err(|source| OsError::Commit {
                offset: self.committed,
                size: extra,
                source,
            })?;
        }

        trace!("Committed {} bytes at offset {}", extra, self.committed);
        self.committed = requested;
        Ok(())
    }

    /// Give committed pages beyond `keep` (rounded up) back to the OS
    ///
    /// Returns the number of bytes decommitted.
    pub fn decommit(&mut self, keep: usize) -> usize {
        let Ok(keep) = round_to_pages(keep, self.granularity) else {
            return 0;
        };
        if keep >= self.committed {
            return 0;
        }

        let len = self.committed - keep;
        // SAFETY: [keep, committed) is committed memory inside the reservation
        unsafe {
            sys::decommit(self.base.as_ptr().add(keep), len);
        }

        trace!("Decommitted {} bytes at offset {}", len, keep);
        self.committed = keep;
        len
    }

    /// Release the whole range back to the OS
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: base/reserved describe exactly the mapping created in `reserve`
        unsafe { sys::release(self.base.as_ptr(), self.reserved) };
        debug!("Released {} bytes at {:p}", self.reserved, self.base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(page_size().is_power_of_two());
    }

    #[test]
    fn test_reserve_rounds_to_pages() {
        let region = Region::reserve(1, OsAllocFlags::NONE).unwrap();
        assert_eq!(region.reserved(), page_size());
        assert_eq!(region.committed(), 0);
    }

    #[test]
    fn test_commit_and_write() {
        let mut region = Region::reserve(4 * page_size(), OsAllocFlags::NONE).unwrap();
        region.commit(1).unwrap();
        assert_eq!(region.committed(), page_size());

        // SAFETY: first page is committed
        unsafe {
            let ptr = region.base().as_ptr();
            ptr.write(0xAB);
            assert_eq!(ptr.read(), 0xAB);
        }
    }

    #[test]
    fn test_commit_past_reservation_fails() {
        let mut region = Region::reserve(2 * page_size(), OsAllocFlags::NONE).unwrap();
        region.commit(page_size()).unwrap();

        let err = region.commit(2 * page_size()).unwrap_err();
        assert!(matches!(err, OsError::ExceedsReservation { .. }));
        assert_eq!(region.committed(), page_size());
    }

    #[test]
    fn test_commit_upfront_flag() {
        let region = Region::reserve(3 * page_size(), OsAllocFlags::COMMIT).unwrap();
        assert_eq!(region.committed(), region.reserved());
    }

    #[test]
    fn test_decommit_keeps_prefix() {
        let mut region = Region::reserve(8 * page_size(), OsAllocFlags::NONE).unwrap();
        region.commit(4 * page_size()).unwrap();

        let released = region.decommit(page_size() + 1);
        assert_eq!(released, 2 * page_size());
        assert_eq!(region.committed(), 2 * page_size());

        assert_eq!(region.decommit(8 * page_size()), 0);
    }

    #[test]
    fn test_flags_combine() {
        let flags = OsAllocFlags::COMMIT | OsAllocFlags::PREFAULT;
        assert!(flags.contains(OsAllocFlags::COMMIT));
        assert!(flags.contains(OsAllocFlags::PREFAULT));
        assert!(!flags.contains(OsAllocFlags::HUGE_2MB));
    }
}
