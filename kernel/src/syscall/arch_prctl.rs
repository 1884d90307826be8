//! TLS base setter/getter for user threads.

use crate::{
    arch::x86_64::{cpu::CpuOps, validate::is_user_address},
    error::{SyscallError, SyscallResult},
    process::{
        memory::{write_user, UserMemory},
        pcb::Process,
        thread::Thread,
    },
};

// x86_64 arch_prctl codes (subset)
pub const ARCH_SET_FS: u64 = 0x1002;
pub const ARCH_GET_FS: u64 = 0x1003;

pub fn sys_arch_prctl<C, M>(
    cpu: &C,
    process: &Process<M>,
    thread: &Thread,
    code: u64,
    addr: u64,
) -> SyscallResult
where
    C: CpuOps + ?Sized,
    M: UserMemory,
{
    match code {
        ARCH_SET_FS => {
            // Zero clears the TLS base.
            if addr != 0 && !is_user_address(addr) {
                return Err(SyscallError::InvalidPointer);
            }
            thread.context.set_tls_base(addr);
            cpu.write_fs_base(addr);
            Ok(0)
        }
        ARCH_GET_FS => {
            let base = thread.context.tls_base();
            write_user(&mut *process.memory_space.lock(), addr, &base)?;
            Ok(0)
        }
        _ => Err(SyscallError::InvalidArgument),
    }
}
