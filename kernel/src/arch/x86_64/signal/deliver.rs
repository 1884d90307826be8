//! Building signal frames

use core::mem::size_of;

use ::x86_64::registers::rflags::RFlags;

use super::{frame::SignalFrameData, stack::place_signal_frame};
use crate::{
    arch::x86_64::{
        cpu::CpuOps,
        diag::{fatal, FatalError},
        fpu::boot_template,
        trap::{FpuSlot, TrapFrame},
        validate::{is_user_address, validate_fpu_state, verify_kernel_stack},
    },
    config::{MAX_SIGNAL_DEPTH, RETURN_SLOT_SIZE},
    error::{KernelError, KernelResult},
    process::{
        commpage::CommpageSlot,
        memory::{write_user, UserMemory},
        pcb::Process,
        signal::SignalAction,
        thread::Thread,
    },
    raii::SignalDepthGuard,
};

/// Redirect `thread` to a signal handler.
///
/// `data` arrives with the signal mask, siginfo and restart value filled in
/// by the generic signal layer; the register state, FPU image and fault
/// metadata are added here. The completed frame is written to the user
/// stack and `trap` is rewritten so the return to user mode enters the
/// commpage signal trampoline with the context address in RDI.
///
/// Errors writing user memory or a corrupt FPU image leave `trap` and the
/// nesting depth untouched.
pub fn setup_signal_frame<C, M>(
    cpu: &C,
    process: &Process<M>,
    thread: &Thread,
    trap: &mut TrapFrame,
    action: &SignalAction,
    data: &mut SignalFrameData,
) -> KernelResult<()>
where
    C: CpuOps + ?Sized,
    M: UserMemory,
{
    verify_kernel_stack(cpu, thread);

    let counter = thread.context.signal_depth_counter();
    let depth = match SignalDepthGuard::enter(counter, MAX_SIGNAL_DEPTH) {
        Ok(guard) => guard,
        Err(depth) => fatal(
            FatalError::SignalDepthOverflow { depth },
            Some(thread),
            Some(trap),
        ),
    };

    if !trap.is_user_mode() {
        fatal(
            FatalError::NotUserMode { cs: trap.cs },
            Some(thread),
            Some(trap),
        );
    }
    if !is_user_address(trap.regs.rsp) {
        fatal(
            FatalError::InvalidUserPointer {
                what: "rsp",
                addr: trap.regs.rsp,
            },
            Some(thread),
            Some(trap),
        );
    }

    *data.registers_mut() = trap.regs;

    let fpu = match &trap.fpu {
        FpuSlot::Captured(state) => *state,
        FpuSlot::Thread => thread.context.lock().fpu,
        FpuSlot::Lazy => *boot_template(),
    };
    validate_fpu_state(&fpu).map_err(|reason| {
        log::warn!(
            "[SIGNAL] Thread {} has corrupt FPU state: {}",
            thread.tid,
            reason
        );
        KernelError::CorruptFpuState { reason }
    })?;
    *data.fpu_mut() = fpu;
    data.fpu_mut().set_fault_metadata(&trap.fault_metadata());

    data.ucontext.uc_stack = thread.alternate_stack();
    data.handler = action.handler;

    let required = size_of::<SignalFrameData>() as u64 + RETURN_SLOT_SIZE;
    let placement = place_signal_frame(thread, trap, action.wants_alternate_stack(), required);

    {
        let mut memory = process.memory_space.lock();
        write_user(&mut *memory, placement.context_address, data)?;
        write_user(&mut *memory, placement.stack_pointer, &trap.regs.rip)?;
    }

    thread.context.set_signal_context(placement.context_address);

    let trampoline = match process.commpage.resolve(CommpageSlot::SignalTrampoline) {
        Some(addr) => addr,
        None => fatal(
            FatalError::MissingCommpageEntry(CommpageSlot::SignalTrampoline),
            Some(thread),
            Some(trap),
        ),
    };

    trap.regs.rsp = placement.stack_pointer;
    trap.regs.rip = trampoline;
    trap.regs.rdi = placement.context_address;
    let flags = trap.rflags() - (RFlags::TRAP_FLAG | RFlags::DIRECTION_FLAG);
    trap.set_rflags(flags);

    let depth_now = depth.depth();
    depth.commit();
    log::debug!(
        "[SIGNAL] Delivered signal {} to thread {}: handler=0x{:x} ctx=0x{:x} sp=0x{:x} alt={} depth={}",
        data.siginfo.si_signo,
        thread.tid,
        action.handler,
        placement.context_address,
        placement.stack_pointer,
        placement.on_alternate_stack,
        depth_now
    );
    Ok(())
}
