use std::ptr;

use windows::Win32::Foundation::HANDLE;

use crate::error::InjectError;
use crate::memory::RemoteAddress;
use crate::native;
use crate::process::ProcessHandle;

/// Reserve-handle argument selecting the special user APC path of the
/// extended queueing form.
const QUEUE_USER_APC_FLAGS_SPECIAL_USER_APC: isize = 0x1;

/// Owned handle to a thread created in a target process. Closed on drop;
/// closing the handle does not affect the thread itself.
pub struct ThreadHandle {
    handle: HANDLE,
}

impl ThreadHandle {
    /// Raw kernel handle for passing to platform calls.
    pub fn raw(&self) -> HANDLE {
        self.handle
    }
}

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        if let Ok(procs) = native::ntdll() {
            // SAFETY: the handle was returned to us by thread creation
            let _ = unsafe { (procs.nt_close)(self.handle) };
        }
    }
}

/// Create a thread in the target process starting at `entry`.
///
/// With `start_suspended` the thread is parked and needs [`resume_thread`]
/// before it runs; otherwise it begins immediately. A null thread handle is
/// treated as [`InjectError::ThreadCreateFailed`] even under a success
/// status, since a null handle is never a valid result on this platform.
pub fn create_thread(
    process: &ProcessHandle,
    entry: RemoteAddress,
    start_suspended: bool,
) -> Result<ThreadHandle, InjectError> {
    let procs = native::ntdll()?;

    let mut handle = HANDLE::default();

    // SAFETY: the entry address points into memory provisioned in the target;
    // out-pointers reference live stack data
    let status = unsafe {
        (procs.rtl_create_user_thread)(
            process.raw(),
            ptr::null_mut(),
            start_suspended as u8,
            0,
            0,
            0,
            entry.as_ptr(),
            ptr::null_mut(),
            &mut handle,
            ptr::null_mut(),
        )
    };

    native::check("RtlCreateUserThread", status, InjectError::ThreadCreateFailed)?;
    if handle.0.is_null() {
        return Err(InjectError::ThreadCreateFailed(0));
    }

    log::debug!(
        "created {} thread at {} in process {}",
        if start_suspended { "suspended" } else { "running" },
        entry,
        process.pid()
    );

    Ok(ThreadHandle { handle })
}

/// Which platform form queues the callback. Both have the same externally
/// observable contract; callers pick a capability, not a platform quirk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApcVariant {
    /// NtQueueApcThread.
    #[default]
    Legacy,
    /// NtQueueApcThreadEx with the special user APC reserve argument.
    Extended,
}

impl ApcVariant {
    pub(crate) fn procedure(self) -> &'static str {
        match self {
            ApcVariant::Legacy => "NtQueueApcThread",
            ApcVariant::Extended => "NtQueueApcThreadEx",
        }
    }
}

/// Queue `callback` onto the thread's asynchronous procedure call list.
///
/// Nothing visible happens until the thread enters an alertable state, which
/// resuming a suspended thread guarantees: a fresh thread drains its APC
/// queue during initialization, before its entry point runs. Queue before
/// resuming: queuing after the resume may miss the alertable window and
/// never fire. That reversed order is a documented platform race, not an
/// error this layer can detect.
pub fn queue_apc(
    thread: &ThreadHandle,
    callback: RemoteAddress,
    variant: ApcVariant,
) -> Result<(), InjectError> {
    let procs = native::ntdll()?;

    // SAFETY: the callback address points into executable memory provisioned
    // in the thread's process
    let status = match variant {
        ApcVariant::Legacy => unsafe {
            (procs.nt_queue_apc_thread)(
                thread.raw(),
                callback.as_ptr(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            )
        },
        ApcVariant::Extended => unsafe {
            (procs.nt_queue_apc_thread_ex)(
                thread.raw(),
                HANDLE(QUEUE_USER_APC_FLAGS_SPECIAL_USER_APC as *mut _),
                callback.as_ptr(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            )
        },
    };

    native::check(variant.procedure(), status, InjectError::QueueFailed)?;

    log::debug!("queued {} callback at {}", variant.procedure(), callback);

    Ok(())
}

/// Transition a suspended thread into a runnable, alertable state.
///
/// This is what makes a previously queued callback fire, or a thread created
/// suspended begin at its entry address. Success confirms only that the
/// scheduler accepted the transition, not that anything executed; callers
/// needing confirmation must observe the target through an external signal.
pub fn resume_thread(thread: &ThreadHandle) -> Result<(), InjectError> {
    let procs = native::ntdll()?;

    let mut previous_suspend_count = 0u32;

    // SAFETY: the thread handle is owned and live
    let status = unsafe { (procs.nt_resume_thread)(thread.raw(), &mut previous_suspend_count) };

    native::check("NtResumeThread", status, InjectError::ResumeFailed)?;

    log::debug!(
        "resumed thread (previous suspend count {})",
        previous_suspend_count
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_is_the_default_variant() {
        assert_eq!(ApcVariant::default(), ApcVariant::Legacy);
    }

    #[test]
    fn variants_name_their_procedures() {
        assert_eq!(ApcVariant::Legacy.procedure(), "NtQueueApcThread");
        assert_eq!(ApcVariant::Extended.procedure(), "NtQueueApcThreadEx");
    }
}
