//! Processor primitives used by the context layer
//!
//! Everything that must execute a privileged or register-level instruction
//! goes through [`CpuOps`]. The kernel uses [`X86_64Cpu`]; host unit tests
//! substitute a recording double so the surrounding logic can run without
//! hardware.

use super::{fpu::FpuState, trap::TrapFrame};
use crate::process::thread::Thread;

/// Hardware operations needed by thread setup and signal handling
pub trait CpuOps {
    /// Current value of RSP.
    fn stack_pointer(&self) -> u64;

    /// Reset the x87/SSE unit and store the resulting FXSAVE image in
    /// `area`.
    fn capture_reset_fpu_state(&self, area: &mut FpuState);

    /// Load the FS segment base used for thread-local storage.
    fn write_fs_base(&self, base: u64);

    /// Random value for stack randomization. Quality may be low.
    fn entropy(&self) -> u64;

    /// Address of the entry routine every new kernel thread starts in.
    fn kernel_thread_trampoline(&self) -> u64;

    /// Load `frame` and `thread`'s FPU state and drop to user mode.
    fn return_to_userland(&self, thread: &Thread, frame: &TrapFrame) -> !;
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub use self::hw::X86_64Cpu;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod hw {
    use core::arch::asm;

    use ::x86_64::{
        instructions::random::RdRand, registers::model_specific::FsBase, VirtAddr,
    };

    use super::CpuOps;
    use crate::{
        arch::x86_64::{
            fpu::{boot_template, FpuState, MXCSR_DEFAULT},
            trap::{FpuSlot, GeneralRegisters, TrapFrame},
        },
        process::thread::Thread,
    };

    /// Image consumed by the `ember_return_to_userland` stub: `fxrstor`
    /// from `fpu`, load the selectors, pop the registers and `iretq`.
    #[repr(C)]
    struct UserReturnFrame {
        fpu: FpuState,
        regs: GeneralRegisters,
        cs: u64,
        ss: u64,
        ds: u64,
        es: u64,
        kernel_stack_top: u64,
    }

    extern "C" {
        /// Provided by the entry assembly. Never returns.
        fn ember_return_to_userland(frame: *const UserReturnFrame) -> !;
        /// First code run by a new kernel thread; pops the thread pointer,
        /// entry and data words pushed by `init_kernel_thread_stack`.
        fn ember_kernel_thread_entry();
    }

    /// The running processor
    pub struct X86_64Cpu;

    impl CpuOps for X86_64Cpu {
        fn stack_pointer(&self) -> u64 {
            let rsp: u64;
            // SAFETY: Reading RSP into a register has no side effects.
            unsafe {
                asm!("mov {}, rsp", out(reg) rsp, options(nomem, nostack, preserves_flags));
            }
            rsp
        }

        fn capture_reset_fpu_state(&self, area: &mut FpuState) {
            let mxcsr: u32 = MXCSR_DEFAULT;
            // SAFETY: FNINIT and LDMXCSR only touch FPU/SSE state, which the
            // boot CPU owns at this point. FXSAVE writes 512 bytes to `area`,
            // a 64-byte aligned FpuState of exactly that size.
            unsafe {
                asm!(
                    "fninit",
                    "ldmxcsr [{mxcsr}]",
                    "fxsave [{area}]",
                    mxcsr = in(reg) &mxcsr as *const u32,
                    area = in(reg) area as *mut FpuState,
                    options(nostack),
                );
            }
        }

        fn write_fs_base(&self, base: u64) {
            // Callers only pass zero or validated user addresses, both
            // canonical.
            if let Ok(addr) = VirtAddr::try_new(base) {
                FsBase::write(addr);
            }
        }

        fn entropy(&self) -> u64 {
            if let Some(value) = RdRand::new().and_then(|rng| rng.get_u64()) {
                return value;
            }
            // SAFETY: RDTSC is always available in long mode and only reads
            // the time stamp counter.
            unsafe { core::arch::x86_64::_rdtsc() }
        }

        fn kernel_thread_trampoline(&self) -> u64 {
            ember_kernel_thread_entry as usize as u64
        }

        fn return_to_userland(&self, thread: &Thread, frame: &TrapFrame) -> ! {
            let fpu = match &frame.fpu {
                FpuSlot::Captured(state) => *state,
                FpuSlot::Thread => thread.context.lock().fpu,
                FpuSlot::Lazy => *boot_template(),
            };
            let image = UserReturnFrame {
                fpu,
                regs: frame.regs,
                cs: u64::from(frame.cs),
                ss: u64::from(frame.ss),
                ds: u64::from(frame.ds),
                es: u64::from(frame.es),
                kernel_stack_top: thread.kernel_stack.top(),
            };
            // SAFETY: `image` is fully initialized and lives on this stack
            // until the stub switches to user mode; the stub never returns,
            // so the borrow cannot outlive the frame.
            unsafe { ember_return_to_userland(&image) }
        }
    }
}
