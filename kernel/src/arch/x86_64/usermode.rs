//! First entry of a thread into user mode
//!
//! [`enter_userspace`] prepares the initial user stack and a synthetic trap
//! frame, then leaves the kernel through [`CpuOps::return_to_userland`]. The
//! thread's outermost user function returns into the commpage thread-exit
//! trampoline.

use super::{
    cpu::CpuOps,
    diag::{fatal, FatalError},
    trap::{FpuSlot, TrapFrame, TrapKind, INITIAL_USER_RFLAGS},
    validate::{is_stack_aligned, is_user_address, is_user_range, verify_kernel_stack},
    USER_CS, USER_DS,
};
use crate::{
    config::{aslr_enabled, RETURN_SLOT_SIZE, STACK_ALIGNMENT, STACK_ASLR_MAX},
    process::{
        commpage::CommpageSlot,
        memory::{write_user, UserMemory},
        pcb::Process,
        thread::Thread,
    },
};

/// Initial user stack pointer for a stack ending at `top`: `top` minus the
/// random offset, aligned to 16, minus the return slot.
fn initial_stack_pointer(top: u64, random: u64) -> Option<u64> {
    let offset = if aslr_enabled() {
        random & (STACK_ASLR_MAX - 1)
    } else {
        0
    };
    let aligned = top.checked_sub(offset)? & !(STACK_ALIGNMENT - 1);
    aligned.checked_sub(RETURN_SLOT_SIZE)
}

/// Start `thread` in user mode at `entry` with `arg1`/`arg2` in RDI/RSI.
///
/// Every input is kernel-constructed, so any inconsistency is fatal.
pub fn enter_userspace<C, M>(
    cpu: &C,
    process: &Process<M>,
    thread: &Thread,
    entry: u64,
    arg1: u64,
    arg2: u64,
) -> !
where
    C: CpuOps + ?Sized,
    M: UserMemory,
{
    verify_kernel_stack(cpu, thread);

    if !is_user_address(entry) {
        fatal(
            FatalError::InvalidUserPointer {
                what: "entry",
                addr: entry,
            },
            Some(thread),
            None,
        );
    }

    let stack = thread.user_stack;
    if stack.size == 0 || !is_user_range(stack.base, stack.size) {
        fatal(
            FatalError::InvalidUserPointer {
                what: "user stack",
                addr: stack.base,
            },
            Some(thread),
            None,
        );
    }

    let sp = match initial_stack_pointer(stack.top(), cpu.entropy()) {
        Some(sp) if sp >= stack.base => sp,
        _ => fatal(
            FatalError::InvalidUserPointer {
                what: "stack top",
                addr: stack.top(),
            },
            Some(thread),
            None,
        ),
    };
    if !is_stack_aligned(sp) {
        fatal(FatalError::MisalignedStack { sp }, Some(thread), None);
    }

    let exit_trampoline = match process.commpage.resolve(CommpageSlot::ThreadExit) {
        Some(addr) => addr,
        None => fatal(
            FatalError::MissingCommpageEntry(CommpageSlot::ThreadExit),
            Some(thread),
            None,
        ),
    };
    let pushed = write_user(&mut *process.memory_space.lock(), sp, &exit_trampoline);
    if let Err(error) = pushed {
        fatal(
            FatalError::UserStackWrite { addr: sp, error },
            Some(thread),
            None,
        );
    }

    let mut frame = TrapFrame::user(TrapKind::Interrupt);
    frame.regs.rdi = arg1;
    frame.regs.rsi = arg2;
    frame.regs.rip = entry;
    frame.regs.rsp = sp;
    frame.regs.rflags = INITIAL_USER_RFLAGS;
    frame.cs = USER_CS.0;
    frame.ss = USER_DS.0;
    frame.ds = USER_DS.0;
    frame.es = USER_DS.0;
    frame.fpu = FpuSlot::Thread;

    {
        let mut saved = thread.context.lock();
        saved.user_sp = sp;
        saved.first_ip = entry;
    }

    log::debug!(
        "[USERMODE] Entering user mode: thread {} of process {} rip=0x{:x} rsp=0x{:x}",
        thread.tid,
        process.pid,
        entry,
        sp
    );
    cpu.return_to_userland(thread, &frame)
}
