//! Fatal-error reporting
//!
//! Broken kernel invariants end here. The register and context dump goes to
//! the log at error level, then the kernel panics.

use core::fmt;

use super::{trap::TrapFrame, validate::FpuFault};
use crate::{
    error::KernelError,
    process::{commpage::CommpageSlot, thread::Thread},
};

/// Kernel invariant that did not hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalError {
    KernelStackOverflow { sp: u64, floor: u64 },
    KernelStackUnderflow { sp: u64, top: u64 },
    /// Stack view handed to thread setup is not inside the thread's stack
    ForeignKernelStack { base: u64, top: u64 },
    /// Ran out of room while seeding a kernel stack
    KernelStackTooSmall { base: u64 },
    SignalDepthOverflow { depth: u32 },
    SignalDepthUnderflow,
    NotUserMode { cs: u16 },
    InvalidUserPointer { what: &'static str, addr: u64 },
    MisalignedStack { sp: u64 },
    SignalStackExhausted { top: u64, floor: u64, required: u64 },
    UserStackWrite { addr: u64, error: KernelError },
    MissingCommpageEntry(CommpageSlot),
    BootTemplateInvalid(FpuFault),
    BootTemplateUnpublished,
    ForgedSignalContext(KernelError),
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KernelStackOverflow { sp, floor } => {
                write!(
                    f,
                    "kernel stack overflow: sp=0x{:x} floor=0x{:x}",
                    sp, floor
                )
            }
            Self::KernelStackUnderflow { sp, top } => {
                write!(f, "sp outside kernel stack: sp=0x{:x} top=0x{:x}", sp, top)
            }
            Self::ForeignKernelStack { base, top } => write!(
                f,
                "stack 0x{:x}..0x{:x} is not this thread's kernel stack",
                base, top
            ),
            Self::KernelStackTooSmall { base } => {
                write!(f, "kernel stack at 0x{:x} too small for bootstrap", base)
            }
            Self::SignalDepthOverflow { depth } => {
                write!(f, "signal nesting depth exceeded ({})", depth)
            }
            Self::SignalDepthUnderflow => write!(f, "signal return without delivery"),
            Self::NotUserMode { cs } => {
                write!(f, "trap frame is not from user mode: cs=0x{:x}", cs)
            }
            Self::InvalidUserPointer { what, addr } => {
                write!(f, "invalid user pointer {}=0x{:x}", what, addr)
            }
            Self::MisalignedStack { sp } => write!(f, "misaligned stack pointer 0x{:x}", sp),
            Self::SignalStackExhausted {
                top,
                floor,
                required,
            } => write!(
                f,
                "signal stack exhausted: top=0x{:x} floor=0x{:x} need=0x{:x}",
                top, floor, required
            ),
            Self::UserStackWrite { addr, error } => {
                write!(f, "user stack write at 0x{:x} failed: {}", addr, error)
            }
            Self::MissingCommpageEntry(slot) => write!(f, "commpage entry {:?} missing", slot),
            Self::BootTemplateInvalid(reason) => {
                write!(f, "boot FPU template invalid: {}", reason)
            }
            Self::BootTemplateUnpublished => write!(f, "boot FPU template not published"),
            Self::ForgedSignalContext(err) => write!(f, "forged signal context: {}", err),
        }
    }
}

/// Log the interrupted register state.
pub fn dump_trap_frame(frame: &TrapFrame) {
    let r = &frame.regs;
    log::error!(
        "  kind={:?} vector={} error=0x{:x} cr2=0x{:x}",
        frame.kind,
        frame.vector,
        frame.error_code,
        frame.fault_address
    );
    log::error!(
        "  rip=0x{:016x} rsp=0x{:016x} rflags=0x{:x}",
        r.rip,
        r.rsp,
        r.rflags
    );
    log::error!(
        "  rax=0x{:016x} rbx=0x{:016x} rcx=0x{:016x} rdx=0x{:016x}",
        r.rax,
        r.rbx,
        r.rcx,
        r.rdx
    );
    log::error!(
        "  rsi=0x{:016x} rdi=0x{:016x} rbp=0x{:016x}",
        r.rsi,
        r.rdi,
        r.rbp
    );
    log::error!(
        "  r8 =0x{:016x} r9 =0x{:016x} r10=0x{:016x} r11=0x{:016x}",
        r.r8,
        r.r9,
        r.r10,
        r.r11
    );
    log::error!(
        "  r12=0x{:016x} r13=0x{:016x} r14=0x{:016x} r15=0x{:016x}",
        r.r12,
        r.r13,
        r.r14,
        r.r15
    );
    log::error!(
        "  cs=0x{:x} ss=0x{:x} ds=0x{:x} es=0x{:x} fs=0x{:x} gs=0x{:x}",
        frame.cs,
        frame.ss,
        frame.ds,
        frame.es,
        frame.fs,
        frame.gs
    );
}

/// Log a thread's identity, stacks and saved context.
pub fn dump_thread_context(thread: &Thread) {
    log::error!(
        "  thread {} ({}) of process {}",
        thread.tid,
        thread.name,
        thread.pid
    );
    log::error!(
        "  kernel stack 0x{:x}..0x{:x}, user stack 0x{:x}..0x{:x}",
        thread.kernel_stack.base,
        thread.kernel_stack.top(),
        thread.user_stack.base,
        thread.user_stack.top()
    );
    log::error!(
        "  signal depth={} context=0x{:x}",
        thread.context.signal_depth(),
        thread.context.signal_context()
    );
    // The caller may already hold the lock.
    match thread.context.try_lock() {
        Some(state) => log::error!(
            "  kernel_sp=0x{:x} syscall_sp=0x{:x} user_sp=0x{:x} tls=0x{:x} first_ip=0x{:x} fpu={:?}",
            state.kernel_sp,
            state.syscall_sp,
            state.user_sp,
            state.tls_base,
            state.first_ip,
            state.fpu
        ),
        None => log::error!("  saved state locked"),
    }
}

/// Report a broken invariant and halt.
#[cold]
pub fn fatal(reason: FatalError, thread: Option<&Thread>, frame: Option<&TrapFrame>) -> ! {
    log::error!("[FATAL] {}", reason);
    if let Some(thread) = thread {
        dump_thread_context(thread);
    }
    if let Some(frame) = frame {
        dump_trap_frame(frame);
    }
    panic!("{}", reason);
}
