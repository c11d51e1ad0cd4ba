use std::ffi::c_void;
use std::fmt;
use std::ptr;

use windows::Win32::Foundation::HANDLE;
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_PROTECTION_FLAGS,
};

use crate::error::InjectError;
use crate::native;
use crate::process::ProcessHandle;

/// Virtual address inside a target process's address space.
///
/// Distinct from local pointers and from sizes so a remote address cannot be
/// dereferenced by accident or passed where a handle is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddress(usize);

impl RemoteAddress {
    pub fn new(address: usize) -> Self {
        Self(address)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }

    pub(crate) fn as_ptr(&self) -> *mut c_void {
        self.0 as *mut c_void
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Memory allocated directly in a target process.
///
/// The region is freed on drop unless [`RemoteAllocation::release`] hands
/// ownership to the target, which a caller must do once execution has been
/// triggered there: the payload has to outlive this object.
pub struct RemoteAllocation {
    process: HANDLE,
    base: RemoteAddress,
    size: usize,
    released: bool,
}

/// Reserve and commit `size` bytes in the target's address space.
///
/// The platform may report success while returning a null base; that is
/// treated as [`InjectError::AllocationFailed`], never as success.
pub fn allocate_direct(
    process: &ProcessHandle,
    size: usize,
    protection: PAGE_PROTECTION_FLAGS,
) -> Result<RemoteAllocation, InjectError> {
    let procs = native::ntdll()?;

    let mut base: *mut c_void = ptr::null_mut();
    let mut region_size = size;

    // SAFETY: out-pointers reference live stack data
    let status = unsafe {
        (procs.nt_allocate_virtual_memory)(
            process.raw(),
            &mut base,
            0,
            &mut region_size,
            (MEM_COMMIT | MEM_RESERVE).0,
            protection.0,
        )
    };

    native::check(
        "NtAllocateVirtualMemory",
        status,
        InjectError::AllocationFailed,
    )?;
    if base.is_null() {
        return Err(InjectError::AllocationFailed(0));
    }

    let allocation = RemoteAllocation {
        process: process.raw(),
        base: RemoteAddress(base as usize),
        size: region_size,
        released: false,
    };

    log::debug!(
        "allocated {} bytes at {} in process {}",
        allocation.size,
        allocation.base,
        process.pid()
    );

    Ok(allocation)
}

impl RemoteAllocation {
    /// Base address of the region in the target's address space.
    pub fn base(&self) -> RemoteAddress {
        self.base
    }

    /// Size actually reserved, rounded up by the platform.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Change the page protection of the whole region, returning the previous
    /// protection. Used to flip a written region from writable to executable.
    pub fn protect(
        &self,
        new_protection: PAGE_PROTECTION_FLAGS,
    ) -> Result<PAGE_PROTECTION_FLAGS, InjectError> {
        let procs = native::ntdll()?;

        let mut base = self.base.as_ptr();
        let mut region_size = self.size;
        let mut old_protection = 0u32;

        // SAFETY: the region was allocated by us and is still mapped
        let status = unsafe {
            (procs.nt_protect_virtual_memory)(
                self.process,
                &mut base,
                &mut region_size,
                new_protection.0,
                &mut old_protection,
            )
        };

        native::check_platform("NtProtectVirtualMemory", status)?;

        log::debug!(
            "protection of {} changed 0x{:X} -> 0x{:X}",
            self.base,
            old_protection,
            new_protection.0
        );

        Ok(PAGE_PROTECTION_FLAGS(old_protection))
    }

    /// Hand the region to the target process: it will no longer be freed on
    /// drop. Call this once execution has been triggered at an address inside
    /// the region.
    pub fn release(mut self) -> RemoteAddress {
        self.released = true;
        self.base
    }
}

impl Drop for RemoteAllocation {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Ok(procs) = native::ntdll() {
            let mut base = self.base.as_ptr();
            let mut region_size = 0usize; // MEM_RELEASE frees the whole allocation
            // SAFETY: the region belongs to us until released
            let _ = unsafe {
                (procs.nt_free_virtual_memory)(
                    self.process,
                    &mut base,
                    &mut region_size,
                    MEM_RELEASE.0,
                )
            };
        }
    }
}

/// Copy `payload` into the target's address space at `destination`.
///
/// The destination range must lie inside a previously provisioned region with
/// write-capable protection. An empty payload is a caller error and fails with
/// [`InjectError::WriteFailed`]; so does a copy the platform reports as
/// shorter than requested. The section strategy never needs this call: its
/// payload is written once, locally, through the local view.
pub fn write_memory(
    process: &ProcessHandle,
    destination: RemoteAddress,
    payload: &[u8],
) -> Result<(), InjectError> {
    if payload.is_empty() {
        return Err(InjectError::WriteFailed(0));
    }

    let procs = native::ntdll()?;

    let mut written = 0usize;

    // SAFETY: payload outlives the call; destination validity is the provisioning contract
    let status = unsafe {
        (procs.nt_write_virtual_memory)(
            process.raw(),
            destination.as_ptr(),
            payload.as_ptr() as *const c_void,
            payload.len(),
            &mut written,
        )
    };

    native::check("NtWriteVirtualMemory", status, InjectError::WriteFailed)?;
    if written != payload.len() {
        return Err(InjectError::WriteFailed(0));
    }

    log::debug!(
        "wrote {} bytes at {} in process {}",
        written,
        destination,
        process.pid()
    );

    Ok(())
}
