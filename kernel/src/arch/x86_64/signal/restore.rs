//! Restoring state from a signal frame

use super::frame::SignalFrameData;
use crate::{
    arch::x86_64::{
        cpu::CpuOps,
        diag::{fatal, FatalError},
        trap::{FpuSlot, TrapFrame, USER_MODIFIABLE_FLAGS},
        validate::{is_user_address, validate_fpu_state, verify_kernel_stack},
        USER_CS, USER_DS,
    },
    config::forged_context_is_fatal,
    error::{KernelError, KernelResult},
    process::thread::Thread,
    raii::SignalReturnGuard,
};

/// Refuse a user-edited context. Fatal when the kernel is built with
/// `fatal-forged-context`.
fn reject(thread: &Thread, trap: &TrapFrame, err: KernelError) -> KernelError {
    if forged_context_is_fatal() {
        fatal(
            FatalError::ForgedSignalContext(err),
            Some(thread),
            Some(trap),
        );
    }
    log::warn!("[SIGNAL] Thread {} sigreturn rejected: {}", thread.tid, err);
    err
}

fn check_selector(
    thread: &Thread,
    trap: &TrapFrame,
    field: &'static str,
    value: u16,
    allowed: &[u16],
) -> KernelResult<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(reject(
            thread,
            trap,
            KernelError::InvalidSignalContext {
                field,
                value: u64::from(value),
            },
        ))
    }
}

/// Load the interrupted state saved in `data` back into `trap` and the
/// thread context.
///
/// `data` is the user copy of the frame and may have been edited by the
/// handler. Only user-controllable state is taken from it: flags outside
/// the user-modifiable set keep their current value and segment selectors
/// must be the user ones. Returns the restored RAX.
pub fn restore_signal_frame<C: CpuOps + ?Sized>(
    cpu: &C,
    thread: &Thread,
    trap: &mut TrapFrame,
    data: &SignalFrameData,
) -> KernelResult<u64> {
    verify_kernel_stack(cpu, thread);

    let guard = match SignalReturnGuard::enter(thread.context.signal_depth_counter()) {
        Some(guard) => guard,
        None => fatal(FatalError::SignalDepthUnderflow, Some(thread), Some(trap)),
    };

    if !trap.is_user_mode() {
        fatal(
            FatalError::NotUserMode { cs: trap.cs },
            Some(thread),
            Some(trap),
        );
    }

    let regs = data.registers();
    for (field, value) in [("rip", regs.rip), ("rsp", regs.rsp)] {
        if !is_user_address(value) {
            return Err(reject(
                thread,
                trap,
                KernelError::InvalidSignalContext { field, value },
            ));
        }
    }

    let fpu = data.fpu();
    if let Err(reason) = validate_fpu_state(fpu) {
        let err = KernelError::CorruptFpuState { reason };
        return Err(reject(thread, trap, err));
    }

    let meta = fpu.fault_metadata();
    let data_selectors = [0, USER_DS.0];
    check_selector(thread, trap, "cs", meta.cs, &[USER_CS.0])?;
    check_selector(thread, trap, "ss", meta.ss, &[USER_DS.0])?;
    check_selector(thread, trap, "ds", meta.ds, &data_selectors)?;
    check_selector(thread, trap, "es", meta.es, &data_selectors)?;
    check_selector(thread, trap, "fs", meta.fs, &data_selectors)?;
    check_selector(thread, trap, "gs", meta.gs, &data_selectors)?;

    let user_flags = USER_MODIFIABLE_FLAGS.bits();
    let rflags = (trap.regs.rflags & !user_flags) | (regs.rflags & user_flags);
    trap.regs = *regs;
    trap.regs.rflags = rflags;
    trap.cs = meta.cs;
    trap.ss = meta.ss;
    trap.ds = meta.ds;
    trap.es = meta.es;
    trap.fs = meta.fs;
    trap.gs = meta.gs;

    thread.context.lock().fpu = *fpu;
    trap.fpu = FpuSlot::Thread;

    guard.commit();
    log::debug!(
        "[SIGNAL] Thread {} returned from signal: rip=0x{:x} rsp=0x{:x} depth={}",
        thread.tid,
        regs.rip,
        regs.rsp,
        thread.context.signal_depth()
    );
    Ok(regs.rax)
}
