//! Error types for the thread-context and signal layer
//!
//! Two families of failure exist here. Recoverable errors ([`KernelError`],
//! [`SyscallError`]) describe bad input at a well-defined boundary, usually
//! data supplied by the thread whose request is being serviced. Kernel
//! invariant violations are not errors at all: they go through
//! [`crate::arch::x86_64::diag::fatal`] and never return.

use core::fmt;

use crate::arch::x86_64::validate::FpuFault;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Address is not usable for the requested access
    InvalidAddress { addr: u64 },
    /// Range `[addr, addr + size)` is not entirely inside the user window
    InvalidUserRange { addr: u64, size: u64 },
    /// No backing memory for a user address
    UnmappedMemory { addr: u64 },
    /// FXSAVE block failed validation
    CorruptFpuState { reason: FpuFault },
    /// A user-edited signal context carries a value the kernel refuses to
    /// load
    InvalidSignalContext { field: &'static str, value: u64 },
    /// System call errors
    SyscallError(SyscallError),
}

/// System call errors, returned to user space as negative values
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidSyscall = -1,
    InvalidArgument = -2,
    PermissionDenied = -3,
    InvalidState = -8,
    InvalidPointer = -9,
    UnmappedMemory = -17,
}

/// Result type alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

/// Result type alias for system call handlers
pub type SyscallResult = Result<u64, SyscallError>;

impl SyscallError {
    /// Raw value placed in RAX for user space.
    pub fn as_raw(self) -> u64 {
        self as i64 as u64
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress { addr } => write!(f, "Invalid address: 0x{:x}", addr),
            Self::InvalidUserRange { addr, size } => {
                write!(f, "Range 0x{:x}+0x{:x} is outside user space", addr, size)
            }
            Self::UnmappedMemory { addr } => write!(f, "Unmapped memory at 0x{:x}", addr),
            Self::CorruptFpuState { reason } => write!(f, "Corrupt FPU state: {}", reason),
            Self::InvalidSignalContext { field, value } => {
                write!(f, "Invalid signal context: {} = 0x{:x}", field, value)
            }
            Self::SyscallError(e) => write!(f, "Syscall error: {:?}", e),
        }
    }
}

impl From<SyscallError> for KernelError {
    fn from(err: SyscallError) -> Self {
        Self::SyscallError(err)
    }
}

impl From<KernelError> for SyscallError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::InvalidAddress { .. } | KernelError::InvalidUserRange { .. } => {
                SyscallError::InvalidPointer
            }
            KernelError::UnmappedMemory { .. } => SyscallError::UnmappedMemory,
            KernelError::CorruptFpuState { .. } | KernelError::InvalidSignalContext { .. } => {
                SyscallError::InvalidArgument
            }
            KernelError::SyscallError(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syscall_error_raw_is_negative() {
        assert_eq!(SyscallError::InvalidArgument.as_raw() as i64, -2);
        assert_eq!(SyscallError::InvalidPointer.as_raw(), (-9i64) as u64);
    }

    #[test]
    fn test_user_range_maps_to_invalid_pointer() {
        let err = KernelError::InvalidUserRange { addr: 0, size: 8 };
        assert_eq!(SyscallError::from(err), SyscallError::InvalidPointer);
    }

    #[test]
    fn test_corrupt_fpu_maps_to_invalid_argument() {
        let err = KernelError::CorruptFpuState {
            reason: FpuFault::ControlWordUnmasked,
        };
        assert_eq!(SyscallError::from(err), SyscallError::InvalidArgument);
    }

    #[test]
    fn test_syscall_error_round_trips_through_kernel_error() {
        let err: KernelError = SyscallError::PermissionDenied.into();
        assert_eq!(SyscallError::from(err), SyscallError::PermissionDenied);
    }
}
