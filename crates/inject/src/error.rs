use std::fmt;

/// Errors that can occur while manipulating a remote process.
///
/// Every variant that wraps a `u32` carries the raw NTSTATUS reported by the
/// failing call. A value of `0` means the platform reported success but
/// returned a null handle or address (or, for writes, that the payload was
/// empty or only partially copied); this layer treats those as failures, never
/// as success.
#[derive(Debug)]
pub enum InjectError {
    /// The process id does not resolve to a live process.
    NotFound(u32),
    /// The requested access rights were refused for the named procedure.
    AccessDenied(&'static str),
    AllocationFailed(u32),
    SectionCreateFailed(u32),
    MapFailed(u32),
    WriteFailed(u32),
    ThreadCreateFailed(u32),
    QueueFailed(u32),
    ResumeFailed(u32),
    /// The procedure could not be resolved from its library.
    ProcedureNotFound(&'static str),
    /// A raw status not otherwise classified, with the procedure that produced it.
    Platform {
        procedure: &'static str,
        status: u32,
    },
}

impl InjectError {
    pub(crate) fn platform(procedure: &'static str, status: u32) -> Self {
        InjectError::Platform { procedure, status }
    }

    /// Raw NTSTATUS carried by this error, if any.
    pub fn status(&self) -> Option<u32> {
        match self {
            InjectError::AllocationFailed(s)
            | InjectError::SectionCreateFailed(s)
            | InjectError::MapFailed(s)
            | InjectError::WriteFailed(s)
            | InjectError::ThreadCreateFailed(s)
            | InjectError::QueueFailed(s)
            | InjectError::ResumeFailed(s)
            | InjectError::Platform { status: s, .. } => Some(*s),
            _ => None,
        }
    }
}

fn status_note(status: u32) -> String {
    if status == 0 {
        "success reported with a null result".to_string()
    } else {
        format!("NTSTATUS 0x{:08X}", status)
    }
}

impl fmt::Display for InjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectError::NotFound(pid) => write!(f, "No live process with id {}", pid),
            InjectError::AccessDenied(procedure) => {
                write!(f, "{} refused the requested access rights", procedure)
            }
            InjectError::AllocationFailed(status) => write!(
                f,
                "Failed to allocate memory in target process ({})",
                status_note(*status)
            ),
            InjectError::SectionCreateFailed(status) => {
                write!(f, "Failed to create section object ({})", status_note(*status))
            }
            InjectError::MapFailed(status) => {
                write!(f, "Failed to map section view ({})", status_note(*status))
            }
            InjectError::WriteFailed(0) => write!(
                f,
                "Failed to write payload to target process (empty payload or short write)"
            ),
            InjectError::WriteFailed(status) => write!(
                f,
                "Failed to write payload to target process (NTSTATUS 0x{:08X})",
                status
            ),
            InjectError::ThreadCreateFailed(status) => write!(
                f,
                "Failed to create thread in target process ({})",
                status_note(*status)
            ),
            InjectError::QueueFailed(status) => write!(
                f,
                "Failed to queue APC on target thread ({})",
                status_note(*status)
            ),
            InjectError::ResumeFailed(status) => {
                write!(f, "Failed to resume target thread ({})", status_note(*status))
            }
            InjectError::ProcedureNotFound(name) => {
                write!(f, "Procedure {} not found in its library", name)
            }
            InjectError::Platform { procedure, status } => {
                write!(f, "{} returned NTSTATUS 0x{:08X}", procedure, status)
            }
        }
    }
}

impl std::error::Error for InjectError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_pid() {
        let message = InjectError::NotFound(4312).to_string();
        assert!(message.contains("4312"));
    }

    #[test]
    fn display_distinguishes_empty_payload_from_status() {
        let empty = InjectError::WriteFailed(0).to_string();
        assert!(empty.contains("empty payload"));

        let status = InjectError::WriteFailed(0xC0000005).to_string();
        assert!(status.contains("0xC0000005"));
    }

    #[test]
    fn platform_carries_procedure_and_status() {
        let err = InjectError::platform("NtProtectVirtualMemory", 0xC0000018);
        let message = err.to_string();
        assert!(message.contains("NtProtectVirtualMemory"));
        assert!(message.contains("0xC0000018"));
        assert_eq!(err.status(), Some(0xC0000018));
    }

    #[test]
    fn null_result_reads_as_hardening_note() {
        let message = InjectError::AllocationFailed(0).to_string();
        assert!(message.contains("null result"));
    }
}
