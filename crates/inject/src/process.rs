use std::ffi::c_void;

use windows::Win32::Foundation::HANDLE;
use windows::Win32::System::Threading::{
    PROCESS_ACCESS_RIGHTS, PROCESS_CREATE_THREAD, PROCESS_QUERY_INFORMATION,
    PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
};

use crate::error::InjectError;
use crate::native::{self, nt_success, status, ClientId, ObjectAttributes};

/// Owned handle to a running process.
///
/// The handle is opened with an explicit access mask and closed exactly once
/// on drop. Request the narrowest mask the operations you intend to perform
/// need; [`ProcessHandle::INJECT_ACCESS`] covers the composed injection
/// sequences in this crate.
pub struct ProcessHandle {
    handle: HANDLE,
    pid: u32,
}

impl ProcessHandle {
    /// Access rights required by the full allocate-write-trigger sequence.
    pub const INJECT_ACCESS: PROCESS_ACCESS_RIGHTS = PROCESS_ACCESS_RIGHTS(
        PROCESS_CREATE_THREAD.0
            | PROCESS_QUERY_INFORMATION.0
            | PROCESS_VM_OPERATION.0
            | PROCESS_VM_READ.0
            | PROCESS_VM_WRITE.0,
    );

    /// Access rights for the section strategy. No VM write right: the payload
    /// never crosses the process boundary through a write call.
    pub const SECTION_ACCESS: PROCESS_ACCESS_RIGHTS = PROCESS_ACCESS_RIGHTS(
        PROCESS_CREATE_THREAD.0 | PROCESS_QUERY_INFORMATION.0 | PROCESS_VM_OPERATION.0,
    );

    /// Open a handle to a live process by id with the requested access mask.
    ///
    /// Fails with [`InjectError::NotFound`] when the id does not resolve,
    /// [`InjectError::AccessDenied`] when the mask is refused, and
    /// [`InjectError::Platform`] for anything else. There is no partial
    /// success: the call returns a fully usable handle or none.
    pub fn open(pid: u32, desired_access: PROCESS_ACCESS_RIGHTS) -> Result<Self, InjectError> {
        let procs = native::ntdll()?;

        let mut handle = HANDLE::default();
        let attributes = ObjectAttributes::empty();
        let client_id = ClientId::for_process(pid);

        // SAFETY: all pointers reference live stack data for the duration of the call
        let status = unsafe {
            (procs.nt_open_process)(&mut handle, desired_access.0, &attributes, &client_id)
        };

        if !nt_success(status) {
            return Err(match status.0 {
                status::STATUS_INVALID_CID => InjectError::NotFound(pid),
                status::STATUS_ACCESS_DENIED => InjectError::AccessDenied("NtOpenProcess"),
                _ => InjectError::platform("NtOpenProcess", status.0 as u32),
            });
        }

        // a null handle under a success status is still a failure
        if handle.0.is_null() {
            return Err(InjectError::platform("NtOpenProcess", 0));
        }

        log::debug!(
            "opened process {} with access mask 0x{:08X}",
            pid,
            desired_access.0
        );

        Ok(Self { handle, pid })
    }

    /// Pseudo-handle for the calling process. Never closed on drop.
    pub fn current() -> Self {
        Self {
            handle: HANDLE(usize::MAX as *mut c_void),
            pid: std::process::id(),
        }
    }

    /// Raw kernel handle for passing to platform calls.
    pub fn raw(&self) -> HANDLE {
        self.handle
    }

    /// Process id this handle was opened from.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn is_current(&self) -> bool {
        self.handle.0 as isize == -1
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.is_current() || self.handle.0.is_null() {
            return;
        }
        if let Ok(procs) = native::ntdll() {
            // SAFETY: the handle was opened by us and is closed exactly here
            let _ = unsafe { (procs.nt_close)(self.handle) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_access_covers_memory_and_thread_rights() {
        let mask = ProcessHandle::INJECT_ACCESS;
        assert!(mask.0 & PROCESS_VM_WRITE.0 != 0);
        assert!(mask.0 & PROCESS_VM_OPERATION.0 != 0);
        assert!(mask.0 & PROCESS_CREATE_THREAD.0 != 0);
    }

    #[test]
    fn section_access_omits_vm_write() {
        assert!(ProcessHandle::SECTION_ACCESS.0 & PROCESS_VM_WRITE.0 == 0);
    }

    #[test]
    fn current_is_a_pseudo_handle() {
        let current = ProcessHandle::current();
        assert!(current.is_current());
        assert_eq!(current.pid(), std::process::id());
    }
}
