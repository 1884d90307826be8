//! System calls owned by the thread-context layer
//!
//! Handlers validate every user pointer before touching it. User-supplied
//! garbage produces a [`SyscallError`]; it never halts the kernel.

pub mod arch_prctl;
pub mod signal;

use crate::{
    arch::x86_64::{context::record_syscall_entry, cpu::CpuOps, trap::TrapFrame},
    error::{SyscallError, SyscallResult},
    process::{memory::UserMemory, pcb::Process, thread::Thread},
};

pub use arch_prctl::sys_arch_prctl;
pub use signal::{sys_sigaltstack, sys_sigreturn};

/// System call numbers handled here
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    SigReturn = 15,
    SigAltStack = 131,
    ArchPrctl = 158,
}

impl TryFrom<u64> for Syscall {
    type Error = SyscallError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            15 => Ok(Syscall::SigReturn),
            131 => Ok(Syscall::SigAltStack),
            158 => Ok(Syscall::ArchPrctl),
            _ => Err(SyscallError::InvalidSyscall),
        }
    }
}

/// Run the system call described by `trap` (number in RAX, arguments in
/// RDI, RSI) and store the result in RAX.
pub fn handle_syscall<C, M>(cpu: &C, process: &Process<M>, thread: &Thread, trap: &mut TrapFrame)
where
    C: CpuOps + ?Sized,
    M: UserMemory,
{
    record_syscall_entry(thread, trap);
    let (number, arg1, arg2) = (trap.regs.rax, trap.regs.rdi, trap.regs.rsi);

    let result: SyscallResult = match Syscall::try_from(number) {
        Ok(Syscall::SigReturn) => sys_sigreturn(cpu, process, thread, trap),
        Ok(Syscall::SigAltStack) => sys_sigaltstack(process, thread, trap, arg1, arg2),
        Ok(Syscall::ArchPrctl) => sys_arch_prctl(cpu, process, thread, arg1, arg2),
        Err(err) => Err(err),
    };

    trap.regs.rax = match result {
        Ok(value) => value,
        Err(err) => {
            log::debug!(
                "[SYSCALL] Thread {} syscall {} failed: {:?}",
                thread.tid,
                number,
                err
            );
            err.as_raw()
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_process, test_thread, user_trap, TestCpu, TEST_USER_STACK_TOP};

    #[test]
    fn test_unknown_syscall_sets_error_in_rax() {
        let cpu = TestCpu::new();
        let process = test_process();
        let thread = test_thread();
        let mut trap = user_trap(TEST_USER_STACK_TOP - 0x100, 0x40_1000);
        trap.regs.rax = 9999;

        handle_syscall(&cpu, &process, &thread, &mut trap);

        assert_eq!(trap.regs.rax, SyscallError::InvalidSyscall.as_raw());
        assert_eq!(thread.context.lock().user_sp, TEST_USER_STACK_TOP - 0x100);
    }

    #[test]
    fn test_arch_prctl_through_dispatch() {
        let cpu = TestCpu::new();
        let process = test_process();
        let thread = test_thread();
        let mut trap = user_trap(TEST_USER_STACK_TOP - 0x100, 0x40_1000);
        trap.regs.rax = Syscall::ArchPrctl as u64;
        trap.regs.rdi = arch_prctl::ARCH_SET_FS;
        trap.regs.rsi = 0x7000_2000;

        handle_syscall(&cpu, &process, &thread, &mut trap);

        assert_eq!(trap.regs.rax, 0);
        assert_eq!(cpu.fs_base.get(), 0x7000_2000);
    }
}
