//! Dynamically resolved ntdll/kernel32 bindings.
//!
//! One registry per library surface, resolved once on first use through
//! `GetModuleHandleW`/`GetProcAddress` and read-only afterwards. All raw
//! status interpretation lives here: callers hand the procedure name, the
//! returned NTSTATUS and their failure family to [`check`], so the
//! success-must-be-nonzero hardening is applied in one place rather than at
//! each call site.

use std::ffi::{c_void, CString};
use std::mem;
use std::sync::OnceLock;

use windows::core::{w, PCSTR};
use windows::Win32::Foundation::{HANDLE, HMODULE, NTSTATUS};
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};

use crate::error::InjectError;

/// NTSTATUS values this crate classifies specially.
pub(crate) mod status {
    pub const STATUS_ACCESS_DENIED: i32 = 0xC0000022_u32 as i32;
    pub const STATUS_INVALID_CID: i32 = 0xC000000B_u32 as i32;
}

/// CLIENT_ID passed to NtOpenProcess.
#[repr(C)]
pub(crate) struct ClientId {
    pub unique_process: *mut c_void,
    pub unique_thread: *mut c_void,
}

impl ClientId {
    pub(crate) fn for_process(pid: u32) -> Self {
        Self {
            unique_process: pid as usize as *mut c_void,
            unique_thread: std::ptr::null_mut(),
        }
    }
}

/// OBJECT_ATTRIBUTES passed to NtOpenProcess. Only the length field is set.
#[repr(C)]
pub(crate) struct ObjectAttributes {
    length: u32,
    root_directory: HANDLE,
    object_name: *const c_void,
    attributes: u32,
    security_descriptor: *const c_void,
    security_quality_of_service: *const c_void,
}

impl ObjectAttributes {
    pub(crate) fn empty() -> Self {
        Self {
            length: mem::size_of::<Self>() as u32,
            root_directory: HANDLE::default(),
            object_name: std::ptr::null(),
            attributes: 0,
            security_descriptor: std::ptr::null(),
            security_quality_of_service: std::ptr::null(),
        }
    }
}

pub(crate) type NtOpenProcessFn = unsafe extern "system" fn(
    process_handle: *mut HANDLE,
    desired_access: u32,
    object_attributes: *const ObjectAttributes,
    client_id: *const ClientId,
) -> NTSTATUS;

pub(crate) type NtAllocateVirtualMemoryFn = unsafe extern "system" fn(
    process_handle: HANDLE,
    base_address: *mut *mut c_void,
    zero_bits: usize,
    region_size: *mut usize,
    allocation_type: u32,
    protection: u32,
) -> NTSTATUS;

pub(crate) type NtProtectVirtualMemoryFn = unsafe extern "system" fn(
    process_handle: HANDLE,
    base_address: *mut *mut c_void,
    region_size: *mut usize,
    new_protection: u32,
    old_protection: *mut u32,
) -> NTSTATUS;

pub(crate) type NtFreeVirtualMemoryFn = unsafe extern "system" fn(
    process_handle: HANDLE,
    base_address: *mut *mut c_void,
    region_size: *mut usize,
    free_type: u32,
) -> NTSTATUS;

pub(crate) type NtWriteVirtualMemoryFn = unsafe extern "system" fn(
    process_handle: HANDLE,
    base_address: *mut c_void,
    buffer: *const c_void,
    buffer_size: usize,
    bytes_written: *mut usize,
) -> NTSTATUS;

pub(crate) type NtCreateSectionFn = unsafe extern "system" fn(
    section_handle: *mut HANDLE,
    desired_access: u32,
    object_attributes: *const ObjectAttributes,
    maximum_size: *mut i64,
    page_protection: u32,
    allocation_attributes: u32,
    file_handle: HANDLE,
) -> NTSTATUS;

pub(crate) type NtMapViewOfSectionFn = unsafe extern "system" fn(
    section_handle: HANDLE,
    process_handle: HANDLE,
    base_address: *mut *mut c_void,
    zero_bits: usize,
    commit_size: usize,
    section_offset: *mut i64,
    view_size: *mut usize,
    inherit_disposition: u32,
    allocation_type: u32,
    protection: u32,
) -> NTSTATUS;

pub(crate) type NtUnmapViewOfSectionFn =
    unsafe extern "system" fn(process_handle: HANDLE, base_address: *mut c_void) -> NTSTATUS;

pub(crate) type RtlCreateUserThreadFn = unsafe extern "system" fn(
    process_handle: HANDLE,
    security_descriptor: *mut c_void,
    create_suspended: u8,
    zero_bits: u32,
    maximum_stack_size: usize,
    committed_stack_size: usize,
    start_address: *mut c_void,
    parameter: *mut c_void,
    thread_handle: *mut HANDLE,
    client_id: *mut ClientId,
) -> NTSTATUS;

pub(crate) type NtQueueApcThreadFn = unsafe extern "system" fn(
    thread_handle: HANDLE,
    apc_routine: *mut c_void,
    apc_argument1: *mut c_void,
    apc_argument2: *mut c_void,
    apc_argument3: *mut c_void,
) -> NTSTATUS;

pub(crate) type NtQueueApcThreadExFn = unsafe extern "system" fn(
    thread_handle: HANDLE,
    user_apc_reserve_handle: HANDLE,
    apc_routine: *mut c_void,
    apc_argument1: *mut c_void,
    apc_argument2: *mut c_void,
    apc_argument3: *mut c_void,
) -> NTSTATUS;

pub(crate) type NtResumeThreadFn = unsafe extern "system" fn(
    thread_handle: HANDLE,
    previous_suspend_count: *mut u32,
) -> NTSTATUS;

pub(crate) type NtCloseFn = unsafe extern "system" fn(handle: HANDLE) -> NTSTATUS;

/// Resolved ntdll procedures used by the injection primitives.
pub(crate) struct Ntdll {
    pub nt_open_process: NtOpenProcessFn,
    pub nt_allocate_virtual_memory: NtAllocateVirtualMemoryFn,
    pub nt_protect_virtual_memory: NtProtectVirtualMemoryFn,
    pub nt_free_virtual_memory: NtFreeVirtualMemoryFn,
    pub nt_write_virtual_memory: NtWriteVirtualMemoryFn,
    pub nt_create_section: NtCreateSectionFn,
    pub nt_map_view_of_section: NtMapViewOfSectionFn,
    pub nt_unmap_view_of_section: NtUnmapViewOfSectionFn,
    pub rtl_create_user_thread: RtlCreateUserThreadFn,
    pub nt_queue_apc_thread: NtQueueApcThreadFn,
    pub nt_queue_apc_thread_ex: NtQueueApcThreadExFn,
    pub nt_resume_thread: NtResumeThreadFn,
    pub nt_close: NtCloseFn,
}

impl Ntdll {
    fn resolve() -> Result<Self, &'static str> {
        // ntdll is mapped into every process before user code runs
        let module = unsafe { GetModuleHandleW(w!("ntdll.dll")) }.map_err(|_| "ntdll.dll")?;

        Ok(Self {
            nt_open_process: proc_address(module, "NtOpenProcess")?,
            nt_allocate_virtual_memory: proc_address(module, "NtAllocateVirtualMemory")?,
            nt_protect_virtual_memory: proc_address(module, "NtProtectVirtualMemory")?,
            nt_free_virtual_memory: proc_address(module, "NtFreeVirtualMemory")?,
            nt_write_virtual_memory: proc_address(module, "NtWriteVirtualMemory")?,
            nt_create_section: proc_address(module, "NtCreateSection")?,
            nt_map_view_of_section: proc_address(module, "NtMapViewOfSection")?,
            nt_unmap_view_of_section: proc_address(module, "NtUnmapViewOfSection")?,
            rtl_create_user_thread: proc_address(module, "RtlCreateUserThread")?,
            nt_queue_apc_thread: proc_address(module, "NtQueueApcThread")?,
            nt_queue_apc_thread_ex: proc_address(module, "NtQueueApcThreadEx")?,
            nt_resume_thread: proc_address(module, "NtResumeThread")?,
            nt_close: proc_address(module, "NtClose")?,
        })
    }
}

static NTDLL: OnceLock<Result<Ntdll, &'static str>> = OnceLock::new();

/// Get the process-wide ntdll registry, resolving it on first use.
pub(crate) fn ntdll() -> Result<&'static Ntdll, InjectError> {
    match NTDLL.get_or_init(Ntdll::resolve) {
        Ok(procs) => Ok(procs),
        Err(name) => Err(InjectError::ProcedureNotFound(name)),
    }
}

/// Resolved kernel32 addresses. These are only used as remote entry points;
/// kernel32 loads at the same base in every process.
pub(crate) struct Kernel32 {
    pub exit_thread: usize,
}

impl Kernel32 {
    fn resolve() -> Result<Self, &'static str> {
        let module = unsafe { GetModuleHandleW(w!("kernel32.dll")) }.map_err(|_| "kernel32.dll")?;

        let exit_thread: unsafe extern "system" fn() -> isize =
            proc_address(module, "ExitThread")?;

        Ok(Self {
            exit_thread: exit_thread as usize,
        })
    }
}

static KERNEL32: OnceLock<Result<Kernel32, &'static str>> = OnceLock::new();

/// Get the process-wide kernel32 registry, resolving it on first use.
pub(crate) fn kernel32() -> Result<&'static Kernel32, InjectError> {
    match KERNEL32.get_or_init(Kernel32::resolve) {
        Ok(procs) => Ok(procs),
        Err(name) => Err(InjectError::ProcedureNotFound(name)),
    }
}

/// Look up one export and reinterpret it as the expected function type.
fn proc_address<T>(module: HMODULE, name: &'static str) -> Result<T, &'static str> {
    let symbol = CString::new(name).unwrap();

    match unsafe { GetProcAddress(module, PCSTR(symbol.as_ptr() as *const u8)) } {
        // SAFETY: T is a function pointer type with the export's actual signature
        Some(farproc) => Ok(unsafe { mem::transmute_copy(&farproc) }),
        None => Err(name),
    }
}

/// NTSTATUS success test.
#[inline]
pub(crate) const fn nt_success(status: NTSTATUS) -> bool {
    status.0 >= 0
}

/// Interpret the raw status of one platform call for an operation family.
///
/// Success passes through. STATUS_ACCESS_DENIED always classifies as
/// [`InjectError::AccessDenied`] so a refused capability mask is never
/// reported as an opaque platform failure; any other failing status becomes
/// the caller's family error carrying the raw code.
pub(crate) fn check(
    procedure: &'static str,
    status: NTSTATUS,
    family: fn(u32) -> InjectError,
) -> Result<(), InjectError> {
    if nt_success(status) {
        return Ok(());
    }
    if status.0 == status::STATUS_ACCESS_DENIED {
        return Err(InjectError::AccessDenied(procedure));
    }
    Err(family(status.0 as u32))
}

/// Like [`check`] but for operations with no dedicated error family.
pub(crate) fn check_platform(procedure: &'static str, status: NTSTATUS) -> Result<(), InjectError> {
    if nt_success(status) {
        return Ok(());
    }
    if status.0 == status::STATUS_ACCESS_DENIED {
        return Err(InjectError::AccessDenied(procedure));
    }
    Err(InjectError::platform(procedure, status.0 as u32))
}
