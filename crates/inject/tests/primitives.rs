//! Exercises the primitives against the test process itself: the suite opens
//! its own pid through the real handle-acquisition path, so every allocation,
//! write and trigger crosses the same platform calls a foreign target would,
//! while read-back stays observable in-process.

#![cfg(windows)]

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};

use inject::{
    allocate_direct, allocate_via_section, create_thread, inject_shellcode_thread, queue_apc,
    resume_thread, write_memory, ApcVariant, InjectError, ProcessHandle, RemoteAddress,
};
use windows::Win32::Foundation::WAIT_OBJECT_0;
use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
use windows::Win32::System::Memory::PAGE_READWRITE;
use windows::Win32::System::Threading::WaitForSingleObject;

fn open_self() -> ProcessHandle {
    ProcessHandle::open(std::process::id(), ProcessHandle::INJECT_ACCESS)
        .expect("open own process")
}

fn wait(thread: &inject::ThreadHandle) {
    let result = unsafe { WaitForSingleObject(thread.raw(), 10_000) };
    assert_eq!(result, WAIT_OBJECT_0, "thread did not finish in time");
}

#[test]
fn direct_allocation_write_round_trips() {
    let process = open_self();
    let allocation = allocate_direct(&process, 64, PAGE_READWRITE).expect("allocate");

    let payload = [0xDEu8, 0xAD, 0xBE, 0xEF, 0x42];
    write_memory(&process, allocation.base(), &payload).expect("write");

    // independent read-back view of the same region
    let mut readback = [0u8; 5];
    let mut read = 0usize;
    unsafe {
        ReadProcessMemory(
            process.raw(),
            allocation.base().as_usize() as *const c_void,
            readback.as_mut_ptr() as *mut c_void,
            readback.len(),
            Some(&mut read),
        )
    }
    .expect("read back");

    assert_eq!(read, payload.len());
    assert_eq!(readback, payload);
}

#[test]
fn empty_payload_fails_with_write_failed() {
    let process = open_self();
    let allocation = allocate_direct(&process, 16, PAGE_READWRITE).expect("allocate");

    match write_memory(&process, allocation.base(), &[]) {
        Err(InjectError::WriteFailed(_)) => {}
        other => panic!("expected WriteFailed, got {:?}", other),
    }
}

#[test]
fn section_views_share_backing_pages() {
    let process = open_self();
    let mapping =
        allocate_via_section(&process, 4096, PAGE_READWRITE, PAGE_READWRITE).expect("section");

    let mut local = mapping.local;
    let remote = mapping.remote;

    let payload = b"written once, locally";
    local.write_bytes(payload).expect("write local view");

    // the target here is this process, so the remote view is directly
    // readable; no write call was ever issued against the remote address
    let seen =
        unsafe { std::slice::from_raw_parts(remote.base().as_usize() as *const u8, payload.len()) };
    assert_eq!(seen, payload);
}

#[test]
fn remote_view_rejects_local_writes() {
    let process = open_self();
    let mapping =
        allocate_via_section(&process, 4096, PAGE_READWRITE, PAGE_READWRITE).expect("section");

    let mut remote = mapping.remote;
    match remote.write_bytes(b"nope") {
        Err(InjectError::WriteFailed(_)) => {}
        other => panic!("expected WriteFailed, got {:?}", other),
    }
}

#[test]
fn open_unknown_pid_is_not_found() {
    // pids are multiples of four; 3 can never name a process
    match ProcessHandle::open(3, ProcessHandle::INJECT_ACCESS) {
        Err(InjectError::NotFound(pid)) => assert_eq!(pid, 3),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

static THREAD_ENTRY_RAN: AtomicBool = AtomicBool::new(false);

unsafe extern "system" fn thread_entry_marker(_parameter: *mut c_void) -> u32 {
    THREAD_ENTRY_RAN.store(true, Ordering::SeqCst);
    0
}

#[test]
fn suspended_thread_runs_entry_only_after_resume() {
    let process = open_self();
    let entry = RemoteAddress::new(thread_entry_marker as usize);

    let thread = create_thread(&process, entry, true).expect("create suspended thread");
    assert!(
        !THREAD_ENTRY_RAN.load(Ordering::SeqCst),
        "suspended thread must not have run"
    );

    resume_thread(&thread).expect("resume");
    wait(&thread);

    assert!(THREAD_ENTRY_RAN.load(Ordering::SeqCst));
}

static APC_RAN: AtomicBool = AtomicBool::new(false);
static APC_ENTRY_RAN: AtomicBool = AtomicBool::new(false);

unsafe extern "system" fn apc_marker(_a: *mut c_void, _b: *mut c_void, _c: *mut c_void) {
    APC_RAN.store(true, Ordering::SeqCst);
}

unsafe extern "system" fn apc_entry_marker(_parameter: *mut c_void) -> u32 {
    APC_ENTRY_RAN.store(true, Ordering::SeqCst);
    0
}

#[test]
fn queued_apc_fires_when_suspended_thread_resumes() {
    let process = open_self();

    let thread = create_thread(
        &process,
        RemoteAddress::new(apc_entry_marker as usize),
        true,
    )
    .expect("create suspended thread");

    // queue before resume: the fresh thread drains its APC queue during
    // initialization, ahead of the entry point
    queue_apc(
        &thread,
        RemoteAddress::new(apc_marker as usize),
        ApcVariant::Legacy,
    )
    .expect("queue apc");

    resume_thread(&thread).expect("resume");
    wait(&thread);

    assert!(APC_RAN.load(Ordering::SeqCst), "callback did not fire");
    assert!(APC_ENTRY_RAN.load(Ordering::SeqCst), "entry did not run");
}

static EXTENDED_APC_RAN: AtomicBool = AtomicBool::new(false);
static EXTENDED_ENTRY_RAN: AtomicBool = AtomicBool::new(false);

unsafe extern "system" fn extended_apc_marker(_a: *mut c_void, _b: *mut c_void, _c: *mut c_void) {
    EXTENDED_APC_RAN.store(true, Ordering::SeqCst);
}

unsafe extern "system" fn extended_entry_marker(_parameter: *mut c_void) -> u32 {
    EXTENDED_ENTRY_RAN.store(true, Ordering::SeqCst);
    0
}

#[test]
fn extended_variant_drives_the_same_outcome() {
    let process = open_self();

    let thread = create_thread(
        &process,
        RemoteAddress::new(extended_entry_marker as usize),
        true,
    )
    .expect("create suspended thread");

    queue_apc(
        &thread,
        RemoteAddress::new(extended_apc_marker as usize),
        ApcVariant::Extended,
    )
    .expect("queue extended apc");

    resume_thread(&thread).expect("resume");
    wait(&thread);

    assert!(EXTENDED_APC_RAN.load(Ordering::SeqCst));
    assert!(EXTENDED_ENTRY_RAN.load(Ordering::SeqCst));
}

static RACE_ENTRY_RAN: AtomicBool = AtomicBool::new(false);

unsafe extern "system" fn race_entry_marker(_parameter: *mut c_void) -> u32 {
    RACE_ENTRY_RAN.store(true, Ordering::SeqCst);
    0
}

unsafe extern "system" fn race_apc_marker(_a: *mut c_void, _b: *mut c_void, _c: *mut c_void) {}

#[test]
fn queue_after_resume_loses_the_race_cleanly() {
    let process = open_self();

    let thread = create_thread(
        &process,
        RemoteAddress::new(race_entry_marker as usize),
        false,
    )
    .expect("create running thread");
    wait(&thread);

    // the alertable window is gone; the queue call may succeed without the
    // callback ever firing, or report a failure, and either way nothing crashes
    match queue_apc(
        &thread,
        RemoteAddress::new(race_apc_marker as usize),
        ApcVariant::Legacy,
    ) {
        Ok(()) | Err(InjectError::QueueFailed(_)) => {}
        Err(other) => panic!("unexpected error kind: {:?}", other),
    }

    assert!(RACE_ENTRY_RAN.load(Ordering::SeqCst));
}

// the end-to-end scenarios execute a written payload, so they are pinned to
// the one architecture the bytes are encoded for
#[cfg(target_arch = "x86_64")]
mod shellcode {
    use super::*;
    use windows::Win32::System::Memory::PAGE_EXECUTE_READWRITE;

    // xor eax, eax / nop / nop / ret
    const RETURN_ZERO: [u8; 5] = [0x31, 0xC0, 0x90, 0x90, 0xC3];

    #[test]
    fn end_to_end_direct_rwx_injection() {
        let process = open_self();

        let allocation =
            allocate_direct(&process, 64, PAGE_EXECUTE_READWRITE).expect("allocate rwx");
        write_memory(&process, allocation.base(), &RETURN_ZERO).expect("write");

        let thread = create_thread(&process, allocation.base(), true).expect("create suspended");
        resume_thread(&thread).expect("resume");
        wait(&thread);

        let base = allocation.release();
        assert_ne!(base.as_usize(), 0);
    }

    #[test]
    fn orchestrated_thread_injection_completes() {
        let injection =
            inject_shellcode_thread(std::process::id(), &RETURN_ZERO).expect("inject");
        wait(&injection.thread);
        assert_ne!(injection.base.as_usize(), 0);
    }

    #[test]
    fn orchestrated_section_injection_completes() {
        let injection =
            inject::inject_shellcode_section(std::process::id(), &RETURN_ZERO).expect("inject");
        wait(&injection.thread);
        assert_ne!(injection.base.as_usize(), 0);
    }

    #[test]
    fn orchestrated_apc_injection_completes() {
        let injection =
            inject::inject_shellcode_apc(std::process::id(), &RETURN_ZERO, ApcVariant::Legacy)
                .expect("inject");
        wait(&injection.thread);
        assert_ne!(injection.base.as_usize(), 0);
    }
}
