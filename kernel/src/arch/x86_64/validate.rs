//! Address, stack and FPU-state validation
//!
//! Every check here is a pure predicate except the kernel-stack checks,
//! which treat a failure as a kernel bug and halt.

use core::fmt;

use super::{
    cpu::CpuOps,
    diag::{fatal, FatalError},
    fpu::FpuState,
};
use crate::{
    config::{KERNEL_STACK_RESERVE, STACK_ALIGNMENT, USER_BASE, USER_END},
    process::thread::Thread,
};

/// Check that `[addr, addr + size)` lies entirely inside the user window.
///
/// A zero-sized range is accepted when `addr` itself is a user address.
/// Wrap-around is rejected.
pub fn is_user_range(addr: u64, size: u64) -> bool {
    if addr < USER_BASE {
        return false;
    }
    if size == 0 {
        return addr < USER_END;
    }
    match addr.checked_add(size) {
        Some(end) => end <= USER_END,
        None => false,
    }
}

pub fn is_user_address(addr: u64) -> bool {
    is_user_range(addr, 1)
}

/// Stack pointer as seen on entry to a function: one return slot below a
/// 16-byte boundary.
pub fn is_stack_aligned(sp: u64) -> bool {
    sp % STACK_ALIGNMENT == 8
}

/// Halt unless `sp` lies in `thread`'s kernel stack, above the reserved
/// bottom area.
pub fn check_kernel_stack(thread: &Thread, sp: u64) {
    let stack = &thread.kernel_stack;
    let floor = stack.base.saturating_add(KERNEL_STACK_RESERVE);
    if sp < floor {
        fatal(
            FatalError::KernelStackOverflow { sp, floor },
            Some(thread),
            None,
        );
    }
    if sp >= stack.top() {
        fatal(
            FatalError::KernelStackUnderflow {
                sp,
                top: stack.top(),
            },
            Some(thread),
            None,
        );
    }
}

/// [`check_kernel_stack`] against the live stack pointer.
pub fn verify_kernel_stack<C: CpuOps + ?Sized>(cpu: &C, thread: &Thread) {
    check_kernel_stack(thread, cpu.stack_pointer());
}

/// Reason an FXSAVE image was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpuFault {
    /// Every x87 exception is unmasked
    ControlWordUnmasked,
    /// FSW reports a pending invalid-operation exception
    PendingInvalidOperation,
    /// FSW reports a pending denormal-operand exception
    PendingDenormal,
    /// All SIMD exceptions unmasked while a SIMD flag is already raised
    SimdExceptionPending { mxcsr: u32 },
    /// MXCSR has bits the processor does not support
    MxcsrReservedBits { mxcsr: u32, supported: u32 },
}

impl fmt::Display for FpuFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ControlWordUnmasked => write!(f, "x87 exceptions all unmasked"),
            Self::PendingInvalidOperation => write!(f, "pending x87 invalid operation"),
            Self::PendingDenormal => write!(f, "pending x87 denormal operand"),
            Self::SimdExceptionPending { mxcsr } => {
                write!(f, "unmasked SIMD exception pending (mxcsr=0x{:x})", mxcsr)
            }
            Self::MxcsrReservedBits { mxcsr, supported } => write!(
                f,
                "reserved MXCSR bits set (mxcsr=0x{:x}, mask=0x{:x})",
                mxcsr, supported
            ),
        }
    }
}

const FCW_EXCEPTION_MASKS: u16 = 0x3F;
const FSW_INVALID_OPERATION: u16 = 1 << 0;
const FSW_DENORMAL: u16 = 1 << 1;
const MXCSR_EXCEPTION_FLAGS: u32 = 0x3F;
const MXCSR_EXCEPTION_MASKS: u32 = 0x3F << 7;

/// Decide whether `state` may be loaded with `fxrstor` without trapping
/// immediately.
pub fn validate_fpu_state(state: &FpuState) -> Result<(), FpuFault> {
    let fcw = state.control_word();
    if fcw & FCW_EXCEPTION_MASKS == 0 {
        return Err(FpuFault::ControlWordUnmasked);
    }

    let fsw = state.status_word();
    if fsw & FSW_INVALID_OPERATION != 0 {
        return Err(FpuFault::PendingInvalidOperation);
    }
    if fsw & FSW_DENORMAL != 0 {
        return Err(FpuFault::PendingDenormal);
    }

    let mxcsr = state.mxcsr();
    if mxcsr & MXCSR_EXCEPTION_MASKS == 0 && mxcsr & MXCSR_EXCEPTION_FLAGS != 0 {
        return Err(FpuFault::SimdExceptionPending { mxcsr });
    }

    let supported = state.supported_mxcsr_bits();
    if mxcsr & !supported != 0 {
        return Err(FpuFault::MxcsrReservedBits { mxcsr, supported });
    }

    Ok(())
}

pub fn is_fpu_state_valid(state: &FpuState) -> bool {
    validate_fpu_state(state).is_ok()
}
