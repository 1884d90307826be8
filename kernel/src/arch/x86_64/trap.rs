//! Saved user register state at a kernel entry
//!
//! The low-level entry stubs build a [`TrapFrame`] for every syscall,
//! interrupt and exception taken from user mode; the exit path loads it back.
//! Signal delivery and `sigreturn` edit it in place.

use ::x86_64::{registers::rflags::RFlags, PrivilegeLevel};

use super::{
    fpu::{FaultMetadata, FpuState},
    USER_CS, USER_DS,
};

/// RFLAGS bits a user program may change through `sigreturn`.
pub const USER_MODIFIABLE_FLAGS: RFlags = RFlags::CARRY_FLAG
    .union(RFlags::PARITY_FLAG)
    .union(RFlags::AUXILIARY_CARRY_FLAG)
    .union(RFlags::ZERO_FLAG)
    .union(RFlags::SIGN_FLAG)
    .union(RFlags::TRAP_FLAG)
    .union(RFlags::DIRECTION_FLAG)
    .union(RFlags::OVERFLOW_FLAG)
    .union(RFlags::ALIGNMENT_CHECK);

/// Bit 1 of RFLAGS is reserved and reads as one.
pub const RFLAGS_RESERVED_ONE: u64 = 1 << 1;

/// RFLAGS for a thread's first user instruction: interrupts enabled, all
/// arithmetic flags clear.
pub const INITIAL_USER_RFLAGS: u64 = RFlags::INTERRUPT_FLAG.bits() | RFLAGS_RESERVED_ONE;

const _: () = assert!(INITIAL_USER_RFLAGS == 0x202);

/// General-purpose registers plus RIP and RFLAGS.
///
/// Field order is part of the signal-context ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneralRegisters {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub rflags: u64,
}

const _: () = assert!(core::mem::size_of::<GeneralRegisters>() == 18 * 8);

/// How the kernel was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapKind {
    Syscall,
    Interrupt,
    Exception,
}

/// Where the interrupted FPU/SSE state currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpuSlot {
    /// Still in the registers, never used by this thread since its last
    /// reset; it equals the boot template.
    Lazy,
    /// Captured into the trap frame by the entry path.
    Captured(FpuState),
    /// In the thread's context store.
    Thread,
}

/// Register snapshot of an interrupted user thread
#[derive(Debug, Clone)]
pub struct TrapFrame {
    pub regs: GeneralRegisters,
    pub cs: u16,
    pub ss: u16,
    pub ds: u16,
    pub es: u16,
    pub fs: u16,
    pub gs: u16,
    /// Error code pushed by the CPU, 0 when the vector has none
    pub error_code: u64,
    pub vector: u32,
    /// CR2 for page faults, 0 otherwise
    pub fault_address: u64,
    pub kind: TrapKind,
    pub fpu: FpuSlot,
}

impl TrapFrame {
    /// Empty frame with user selectors and the initial flag state.
    pub fn user(kind: TrapKind) -> Self {
        Self {
            regs: GeneralRegisters {
                rflags: INITIAL_USER_RFLAGS,
                ..GeneralRegisters::default()
            },
            cs: USER_CS.0,
            ss: USER_DS.0,
            ds: USER_DS.0,
            es: USER_DS.0,
            fs: 0,
            gs: 0,
            error_code: 0,
            vector: 0,
            fault_address: 0,
            kind,
            fpu: FpuSlot::Thread,
        }
    }

    /// True if the interrupted code ran at ring 3.
    pub fn is_user_mode(&self) -> bool {
        self.cs & 0x3 == PrivilegeLevel::Ring3 as u16
    }

    pub fn rflags(&self) -> RFlags {
        RFlags::from_bits_retain(self.regs.rflags)
    }

    pub fn set_rflags(&mut self, flags: RFlags) {
        self.regs.rflags = flags.bits();
    }

    /// Trap-time metadata in the form stored alongside a signal context.
    pub fn fault_metadata(&self) -> FaultMetadata {
        FaultMetadata {
            fault_address: self.fault_address,
            error_code: self.error_code,
            cs: self.cs,
            ss: self.ss,
            ds: self.ds,
            es: self.es,
            fs: self.fs,
            gs: self.gs,
            trap_vector: self.vector,
        }
    }
}
