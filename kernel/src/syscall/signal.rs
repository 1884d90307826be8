//! Signal-related system calls

use crate::{
    arch::x86_64::{
        cpu::CpuOps,
        signal::{restore_signal_frame, SignalFrameData, SignalStack, SignalStackFlags},
        trap::TrapFrame,
        validate::is_user_range,
    },
    config::MIN_SIGNAL_STACK_SIZE,
    error::{SyscallError, SyscallResult},
    process::{
        memory::{read_user, write_user, UserMemory},
        pcb::Process,
        thread::Thread,
    },
};

/// Return from a signal handler.
///
/// The commpage trampoline passes the context address it was given in RDI
/// back unchanged. On success the trap frame holds the interrupted state and
/// the returned value is the interrupted RAX.
pub fn sys_sigreturn<C, M>(
    cpu: &C,
    process: &Process<M>,
    thread: &Thread,
    trap: &mut TrapFrame,
) -> SyscallResult
where
    C: CpuOps + ?Sized,
    M: UserMemory,
{
    // A thread with no live frame is misusing the syscall; only the
    // restorer's own bookkeeping can make that fatal.
    if thread.context.signal_depth() == 0 {
        log::warn!(
            "[SIGNAL] Thread {} called sigreturn outside a handler",
            thread.tid
        );
        return Err(SyscallError::InvalidState);
    }

    let context_addr = trap.regs.rdi;
    let data: SignalFrameData = read_user(&*process.memory_space.lock(), context_addr)?;
    restore_signal_frame(cpu, thread, trap, &data).map_err(SyscallError::from)
}

/// Install and/or query the alternate signal stack.
///
/// `new_ptr` and `old_ptr` are user pointers to [`SignalStack`]; either may
/// be zero. The old descriptor is reported before the new one takes effect.
pub fn sys_sigaltstack<M: UserMemory>(
    process: &Process<M>,
    thread: &Thread,
    trap: &TrapFrame,
    new_ptr: u64,
    old_ptr: u64,
) -> SyscallResult {
    let current = thread.alternate_stack();
    let on_stack = current.contains(trap.regs.rsp);

    let replacement = if new_ptr != 0 {
        let requested: SignalStack = read_user(&*process.memory_space.lock(), new_ptr)?;
        if on_stack {
            return Err(SyscallError::PermissionDenied);
        }
        let flags = SignalStackFlags::from_bits(requested.ss_flags)
            .ok_or(SyscallError::InvalidArgument)?;
        if flags.contains(SignalStackFlags::ONSTACK) {
            return Err(SyscallError::InvalidArgument);
        }
        if flags.contains(SignalStackFlags::DISABLE) {
            Some(SignalStack::disabled())
        } else {
            if requested.ss_size < MIN_SIGNAL_STACK_SIZE {
                return Err(SyscallError::InvalidArgument);
            }
            if !is_user_range(requested.ss_sp, requested.ss_size) {
                return Err(SyscallError::InvalidPointer);
            }
            Some(SignalStack::new(requested.ss_sp, requested.ss_size))
        }
    } else {
        None
    };

    if old_ptr != 0 {
        let mut old = current;
        if on_stack {
            old.ss_flags |= SignalStackFlags::ONSTACK.bits();
        }
        write_user(&mut *process.memory_space.lock(), old_ptr, &old)?;
    }

    if let Some(stack) = replacement {
        *thread.signal_stack.lock() = stack;
        log::debug!(
            "[SIGNAL] Thread {} alternate stack: base=0x{:x} size=0x{:x} enabled={}",
            thread.tid,
            stack.ss_sp,
            stack.ss_size,
            stack.is_enabled()
        );
    }
    Ok(0)
}
