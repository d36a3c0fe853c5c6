//! `mmap`-based provider

use super::{OsAllocFlags, OsError};
use common::constants::memory::FALLBACK_PAGE_SIZE;
use std::io;
use std::ptr::{self, NonNull};

// Huge page size selectors from mmap(2)
#[cfg(target_os = "linux")]
const MAP_HUGE_SHIFT: libc::c_int = 26;
#[cfg(target_os = "linux")]
const MAP_HUGE_2MB: libc::c_int = 21 << MAP_HUGE_SHIFT;
#[cfg(target_os = "linux")]
const MAP_HUGE_1GB: libc::c_int = 30 << MAP_HUGE_SHIFT;

pub(super) fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size)
        .ok()
        .filter(|s| s.is_power_of_two())
        .unwrap_or(FALLBACK_PAGE_SIZE)
}

#[cfg(target_os = "linux")]
fn platform_map_flags(flags: OsAllocFlags) -> Result<libc::c_int, OsError> {
    let mut map_flags = 0;
    if flags.contains(OsAllocFlags::HUGE_2MB) {
        map_flags |= libc::MAP_HUGETLB | MAP_HUGE_2MB;
    } else if flags.contains(OsAllocFlags::HUGE_1GB) {
        map_flags |= libc::MAP_HUGETLB | MAP_HUGE_1GB;
    }
    if flags.contains(OsAllocFlags::PREFAULT) {
        map_flags |= libc::MAP_POPULATE;
    }
    if !flags.contains(OsAllocFlags::COMMIT) {
        map_flags |= libc::MAP_NORESERVE;
    }
    Ok(map_flags)
}

#[cfg(not(target_os = "linux"))]
fn platform_map_flags(flags: OsAllocFlags) -> Result<libc::c_int, OsError> {
    let linux_only = OsAllocFlags::HUGE_2MB | OsAllocFlags::HUGE_1GB | OsAllocFlags::PREFAULT;
    if (flags.0 & linux_only.0) != 0 {
        return Err(OsError::Unsupported { flags });
    }
    Ok(0)
}

pub(super) fn reserve(size: usize, flags: OsAllocFlags) -> Result<NonNull<u8>, OsError> {
    let prot = if flags.contains(OsAllocFlags::COMMIT) {
        libc::PROT_READ | libc::PROT_WRITE
    } else {
        libc::PROT_NONE
    };
    let map_flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | platform_map_flags(flags)?;

    // SAFETY: anonymous mapping with a null hint, no file descriptor involved
    let ptr = unsafe { libc::mmap(ptr::null_mut(), size, prot, map_flags, -1, 0) };
    if ptr == libc::MAP_FAILED {
        return Err(OsError::Reserve {
            size,
            source: io::Error::last_os_error(),
        });
    }

    NonNull::new(ptr.cast::<u8>()).ok_or_else(|| OsError::Reserve {
        size,
        source: io::Error::other("mmap returned null"),
    })
}

/// # Safety
///
/// `[start, start + size)` must lie inside a live reservation.
pub(super) unsafe fn commit(start: *mut u8, size: usize) -> io::Result<()> {
    // SAFETY: upheld by caller
    let rc = unsafe {
        libc::mprotect(
            start.cast::<libc::c_void>(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// # Safety
///
/// `[start, start + size)` must lie inside a live reservation.
pub(super) unsafe fn decommit(start: *mut u8, size: usize) {
    // SAFETY: upheld by caller; failures leave the pages committed, which is harmless
    unsafe {
        let _ = libc::madvise(start.cast::<libc::c_void>(), size, libc::MADV_DONTNEED);
        let _ = libc::mprotect(start.cast::<libc::c_void>(), size, libc::PROT_NONE);
    }
}

/// # Safety
///
/// `start` and `size` must describe a whole mapping returned by [`reserve`].
pub(super) unsafe fn release(start: *mut u8, size: usize) {
    // SAFETY: upheld by caller
    let rc = unsafe { libc::munmap(start.cast::<libc::c_void>(), size) };
    if rc != 0 {
        tracing::error!(
            "munmap failed for {} bytes at {:p}: {}",
            size,
            start,
            io::Error::last_os_error()
        );
    }
}
