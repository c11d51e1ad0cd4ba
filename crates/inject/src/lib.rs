#![cfg(windows)]

//! Remote-process memory and execution primitives.
//!
//! Everything needed to place a payload inside another running process and
//! start executing it there: open a process handle with explicit access
//! rights, provision remote memory (direct allocation, or a shared section
//! mapped into both processes), write payload bytes, and trigger execution
//! (a new remote thread, or an APC queued onto a suspended thread that is
//! then resumed).
//!
//! The valid ordering is open, provision, write, trigger; for the APC
//! trigger, queue before resume. The composed sequences in this crate encode
//! that ordering; all primitives are synchronous, perform no retries, and
//! surface every platform failure to the caller.

mod error;
mod inject;
mod memory;
mod native;
mod process;
mod section;
mod thread;

pub use error::InjectError;
pub use inject::{
    inject_shellcode_apc, inject_shellcode_section, inject_shellcode_thread, Injection,
};
pub use memory::{allocate_direct, write_memory, RemoteAddress, RemoteAllocation};
pub use process::ProcessHandle;
pub use section::{allocate_via_section, MappedView, Section, SectionMapping};
pub use thread::{create_thread, queue_apc, resume_thread, ApcVariant, ThreadHandle};
