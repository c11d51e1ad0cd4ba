use std::ffi::c_void;
use std::ptr;

use windows::Win32::Foundation::HANDLE;
use windows::Win32::System::Memory::{
    PAGE_EXECUTE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY,
    PAGE_PROTECTION_FLAGS, PAGE_READONLY, PAGE_READWRITE, PAGE_WRITECOPY,
};

use crate::error::InjectError;
use crate::memory::RemoteAddress;
use crate::native;
use crate::process::ProcessHandle;

// section object constants (winnt.h)
const SECTION_ALL_ACCESS: u32 = 0x000F_001F;
const SEC_COMMIT: u32 = 0x0800_0000;
const VIEW_UNMAP: u32 = 2;

/// Owned handle to a pagefile-backed section object.
///
/// A section is a block of backing memory mappable into one or more address
/// spaces at once. The kernel destroys it only after every view and the
/// creating handle are gone, so closing this handle while views exist is safe.
pub struct Section {
    handle: HANDLE,
    size: usize,
}

impl Section {
    /// Create an unnamed committed section of at least `size` bytes whose page
    /// protection must cover every protection later requested for a view.
    pub fn create(size: usize, protection: PAGE_PROTECTION_FLAGS) -> Result<Self, InjectError> {
        let procs = native::ntdll()?;

        let mut handle = HANDLE::default();
        let mut maximum_size = size as i64;

        // SAFETY: out-pointers reference live stack data; no file backs the section
        let status = unsafe {
            (procs.nt_create_section)(
                &mut handle,
                SECTION_ALL_ACCESS,
                ptr::null(),
                &mut maximum_size,
                protection.0,
                SEC_COMMIT,
                HANDLE::default(),
            )
        };

        native::check("NtCreateSection", status, InjectError::SectionCreateFailed)?;
        if handle.0.is_null() {
            return Err(InjectError::SectionCreateFailed(0));
        }

        log::debug!("created section of {} bytes", size);

        Ok(Self { handle, size })
    }

    /// Map a view of the whole section into `process` with the requested
    /// protection.
    pub fn map_view(
        &self,
        process: &ProcessHandle,
        protection: PAGE_PROTECTION_FLAGS,
    ) -> Result<MappedView, InjectError> {
        let procs = native::ntdll()?;

        let mut base: *mut c_void = ptr::null_mut();
        let mut view_size = self.size;
        let mut section_offset: i64 = 0;

        // SAFETY: section handle and process handle are both owned and live
        let status = unsafe {
            (procs.nt_map_view_of_section)(
                self.handle,
                process.raw(),
                &mut base,
                0,
                0,
                &mut section_offset,
                &mut view_size,
                VIEW_UNMAP,
                0,
                protection.0,
            )
        };

        native::check("NtMapViewOfSection", status, InjectError::MapFailed)?;
        if base.is_null() {
            return Err(InjectError::MapFailed(0));
        }

        let view = MappedView {
            process: process.raw(),
            local: process.is_current(),
            base: RemoteAddress::new(base as usize),
            size: view_size,
            released: false,
        };

        log::debug!(
            "mapped {} byte view at {} in process {}",
            view.size,
            view.base,
            process.pid()
        );

        Ok(view)
    }

    /// Declared maximum size of the section.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for Section {
    fn drop(&mut self) {
        if let Ok(procs) = native::ntdll() {
            // SAFETY: the creating handle is closed exactly here; live views
            // keep the section object alive
            let _ = unsafe { (procs.nt_close)(self.handle) };
        }
    }
}

/// One mapping of a section into one process's address space.
///
/// A local view and a remote view of the same section alias the same physical
/// pages: bytes written through the local view are observable through the
/// remote view without any cross-process copy. Views unmap on drop unless
/// [`MappedView::release`] hands them to the target.
pub struct MappedView {
    process: HANDLE,
    local: bool,
    base: RemoteAddress,
    size: usize,
    released: bool,
}

impl MappedView {
    /// Base address of the view in the owning process's address space.
    pub fn base(&self) -> RemoteAddress {
        self.base
    }

    /// Size of the view, rounded up by the platform.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Copy `payload` into the view. Only valid on a view mapped into the
    /// calling process; the payload must be non-empty and fit the view.
    pub fn write_bytes(&mut self, payload: &[u8]) -> Result<(), InjectError> {
        if !self.local {
            // a remote view is not addressable from here
            return Err(InjectError::WriteFailed(0));
        }
        if payload.is_empty() || payload.len() > self.size {
            return Err(InjectError::WriteFailed(0));
        }

        // SAFETY: the view is mapped writable in this process and holds at
        // least payload.len() bytes
        unsafe {
            ptr::copy_nonoverlapping(payload.as_ptr(), self.base.as_ptr() as *mut u8, payload.len());
        }

        log::debug!("wrote {} bytes through local view at {}", payload.len(), self.base);

        Ok(())
    }

    /// Hand the view to its process: it will no longer be unmapped on drop.
    /// Call this on the remote view once execution has been triggered in it.
    pub fn release(mut self) -> RemoteAddress {
        self.released = true;
        self.base
    }
}

impl Drop for MappedView {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Ok(procs) = native::ntdll() {
            // SAFETY: the view is still mapped in the recorded process
            let _ = unsafe { (procs.nt_unmap_view_of_section)(self.process, self.base.as_ptr()) };
        }
    }
}

/// The two views returned by [`allocate_via_section`].
pub struct SectionMapping {
    /// Writable view in the calling process. Write the payload through this.
    pub local: MappedView,
    /// View in the target process, typically executable.
    pub remote: MappedView,
}

/// Provision remote memory through a shared section.
///
/// Creates a section sized to `size` with a page protection covering the union
/// of both view protections, maps a view into the calling process with
/// `local_protection` and one into the target with `remote_protection`. The
/// payload is written once, through the local view, and is immediately
/// visible through the remote view: no cross-process copy ever happens, and
/// the remote view never needs to be writable (write-xor-execute).
///
/// Section creation and view mapping fail distinctly
/// ([`InjectError::SectionCreateFailed`] / [`InjectError::MapFailed`]); a
/// failure between the two still closes the section handle.
pub fn allocate_via_section(
    process: &ProcessHandle,
    size: usize,
    local_protection: PAGE_PROTECTION_FLAGS,
    remote_protection: PAGE_PROTECTION_FLAGS,
) -> Result<SectionMapping, InjectError> {
    let section = Section::create(size, protection_union(local_protection, remote_protection))?;

    let local = section.map_view(&ProcessHandle::current(), local_protection)?;
    let remote = section.map_view(process, remote_protection)?;

    // the creating section handle closes when `section` drops here; the two
    // views keep the backing pages alive
    Ok(SectionMapping { local, remote })
}

/// Smallest standard protection covering both arguments.
fn protection_union(
    a: PAGE_PROTECTION_FLAGS,
    b: PAGE_PROTECTION_FLAGS,
) -> PAGE_PROTECTION_FLAGS {
    let (a_write, a_execute) = protection_bits(a);
    let (b_write, b_execute) = protection_bits(b);

    match (a_write || b_write, a_execute || b_execute) {
        (false, false) => PAGE_READONLY,
        (true, false) => PAGE_READWRITE,
        (false, true) => PAGE_EXECUTE_READ,
        (true, true) => PAGE_EXECUTE_READWRITE,
    }
}

fn protection_bits(protection: PAGE_PROTECTION_FLAGS) -> (bool, bool) {
    if protection == PAGE_EXECUTE_READWRITE || protection == PAGE_EXECUTE_WRITECOPY {
        (true, true)
    } else if protection == PAGE_EXECUTE || protection == PAGE_EXECUTE_READ {
        (false, true)
    } else if protection == PAGE_READWRITE || protection == PAGE_WRITECOPY {
        (true, false)
    } else {
        (false, false)
    }
}
