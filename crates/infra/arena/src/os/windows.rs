//! `VirtualAlloc`-based provider

use super::{OsAllocFlags, OsError};
use common::constants::memory::FALLBACK_PAGE_SIZE;
use std::io;
use std::ptr::{self, NonNull};
use windows_sys::Win32::System::Memory::{
    MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_NOACCESS, PAGE_READWRITE,
    VirtualAlloc, VirtualFree,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

pub(super) fn page_size() -> usize {
    // SAFETY: SYSTEM_INFO is plain data and GetSystemInfo fills it in
    let info = unsafe {
        let mut info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut info);
        info
    };
    usize::try_from(info.dwPageSize)
        .ok()
        .filter(|s| s.is_power_of_two())
        .unwrap_or(FALLBACK_PAGE_SIZE)
}

pub(super) fn reserve(size: usize, flags: OsAllocFlags) -> Result<NonNull<u8>, OsError> {
    let linux_only = OsAllocFlags::HUGE_2MB | OsAllocFlags::HUGE_1GB | OsAllocFlags::PREFAULT;
    if (flags.0 & linux_only.0) != 0 {
        return Err(OsError::Unsupported { flags });
    }

    let (kind, protect) = if flags.contains(OsAllocFlags::COMMIT) {
        (MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE)
    } else {
        (MEM_RESERVE, PAGE_NOACCESS)
    };

    // SAFETY: null address lets the system choose the placement
    let ptr = unsafe { VirtualAlloc(ptr::null(), size, kind, protect) };
    NonNull::new(ptr.cast::<u8>()).ok_or_else(|| OsError::Reserve {
        size,
        source: io::Error::last_os_error(),
    })
}

/// # Safety
///
/// `[start, start + size)` must lie inside a live reservation.
pub(super) unsafe fn commit(start: *mut u8, size: usize) -> io::Result<()> {
    // SAFETY: upheld by caller
    let ptr = unsafe { VirtualAlloc(start.cast(), size, MEM_COMMIT, PAGE_READWRITE) };
    if ptr.is_null() {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// # Safety
///
/// `[start, start + size)` must lie inside a live reservation.
pub(super) unsafe fn decommit(start: *mut u8, size: usize) {
    // SAFETY: upheld by caller
    unsafe {
        VirtualFree(start.cast(), size, MEM_DECOMMIT);
    }
}

/// # Safety
///
/// `start` must be the base returned by [`reserve`].
pub(super) unsafe fn release(start: *mut u8, _size: usize) {
    // SAFETY: MEM_RELEASE requires size 0 and the reservation base
    let ok = unsafe { VirtualFree(start.cast(), 0, MEM_RELEASE) };
    if ok == 0 {
        tracing::error!(
            "VirtualFree failed at {:p}: {}",
            start,
            io::Error::last_os_error()
        );
    }
}
