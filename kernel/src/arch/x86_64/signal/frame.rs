//! User-visible signal frame layout
//!
//! These structures are shared with user space and must keep their exact
//! layout. None of them has implicit padding; reserved space is spelled out.

use bitflags::bitflags;

use crate::{
    arch::x86_64::{fpu::FpuState, trap::GeneralRegisters},
    process::memory::Pod,
};

bitflags! {
    /// `ss_flags` of a [`SignalStack`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SignalStackFlags: i32 {
        /// The thread is currently executing on the stack (query only).
        const ONSTACK = 1;
        /// The stack is not in use.
        const DISABLE = 2;
    }
}

/// Alternate signal stack descriptor (`stack_t`)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalStack {
    pub ss_sp: u64,
    pub ss_flags: i32,
    pub _pad: i32,
    pub ss_size: u64,
}

impl SignalStack {
    pub const fn disabled() -> Self {
        Self {
            ss_sp: 0,
            ss_flags: SignalStackFlags::DISABLE.bits(),
            _pad: 0,
            ss_size: 0,
        }
    }

    pub const fn new(base: u64, size: u64) -> Self {
        Self {
            ss_sp: base,
            ss_flags: 0,
            _pad: 0,
            ss_size: size,
        }
    }

    pub fn flags(&self) -> SignalStackFlags {
        SignalStackFlags::from_bits_retain(self.ss_flags)
    }

    pub fn is_enabled(&self) -> bool {
        !self.flags().contains(SignalStackFlags::DISABLE) && self.ss_size != 0
    }

    pub fn top(&self) -> u64 {
        self.ss_sp.saturating_add(self.ss_size)
    }

    /// True if `sp` is inside the stack (the top counts).
    pub fn contains(&self, sp: u64) -> bool {
        self.is_enabled() && sp > self.ss_sp && sp <= self.top()
    }
}

/// Register file saved in a signal context
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineContext {
    pub gregs: GeneralRegisters,
    pub _reserved: [u64; 6],
    /// FXSAVE image, fault metadata in its software area
    pub fpu: FpuState,
}

/// `ucontext_t`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserContext {
    pub uc_flags: u64,
    pub uc_link: u64,
    pub uc_stack: SignalStack,
    pub uc_sigmask: u64,
    pub _reserved: [u64; 2],
    pub uc_mcontext: MachineContext,
}

/// `siginfo_t`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalInfo {
    pub si_signo: i32,
    pub si_errno: i32,
    pub si_code: i32,
    pub _pad: i32,
    pub si_addr: u64,
    pub si_value: u64,
    pub _fields: [u64; 12],
}

/// Complete signal context written to the user stack
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalFrameData {
    pub ucontext: UserContext,
    pub siginfo: SignalInfo,
    /// Handler the trampoline calls
    pub handler: u64,
    /// Value RAX receives if the interrupted syscall is not restarted
    pub syscall_return: u64,
    pub _reserved: [u64; 6],
}

impl SignalFrameData {
    /// Frame with every field zero.
    pub const fn zeroed() -> Self {
        Self {
            ucontext: UserContext {
                uc_flags: 0,
                uc_link: 0,
                uc_stack: SignalStack {
                    ss_sp: 0,
                    ss_flags: 0,
                    _pad: 0,
                    ss_size: 0,
                },
                uc_sigmask: 0,
                _reserved: [0; 2],
                uc_mcontext: MachineContext {
                    gregs: GeneralRegisters {
                        rax: 0,
                        rbx: 0,
                        rcx: 0,
                        rdx: 0,
                        rsi: 0,
                        rdi: 0,
                        rbp: 0,
                        rsp: 0,
                        r8: 0,
                        r9: 0,
                        r10: 0,
                        r11: 0,
                        r12: 0,
                        r13: 0,
                        r14: 0,
                        r15: 0,
                        rip: 0,
                        rflags: 0,
                    },
                    _reserved: [0; 6],
                    fpu: FpuState::zeroed(),
                },
            },
            siginfo: SignalInfo {
                si_signo: 0,
                si_errno: 0,
                si_code: 0,
                _pad: 0,
                si_addr: 0,
                si_value: 0,
                _fields: [0; 12],
            },
            handler: 0,
            syscall_return: 0,
            _reserved: [0; 6],
        }
    }

    /// Frame for signal `signo` with the given mask and restart value.
    pub fn for_signal(signo: i32, sigmask: u64, syscall_return: u64) -> Self {
        let mut data = Self::zeroed();
        data.siginfo.si_signo = signo;
        data.ucontext.uc_sigmask = sigmask;
        data.syscall_return = syscall_return;
        data
    }

    pub fn registers(&self) -> &GeneralRegisters {
        &self.ucontext.uc_mcontext.gregs
    }

    pub fn registers_mut(&mut self) -> &mut GeneralRegisters {
        &mut self.ucontext.uc_mcontext.gregs
    }

    pub fn fpu(&self) -> &FpuState {
        &self.ucontext.uc_mcontext.fpu
    }

    pub fn fpu_mut(&mut self) -> &mut FpuState {
        &mut self.ucontext.uc_mcontext.fpu
    }
}

impl Default for SignalFrameData {
    fn default() -> Self {
        Self::zeroed()
    }
}

// SAFETY: repr(C), all fields are integers or padding-free repr(C)
// aggregates of integers (checked by the size assertions below).
unsafe impl Pod for SignalStack {}
// SAFETY: As above; the FXSAVE block is a plain byte array.
unsafe impl Pod for SignalFrameData {}

const _: () = assert!(core::mem::size_of::<SignalStack>() == 24);
const _: () = assert!(core::mem::size_of::<MachineContext>() == 704);
const _: () = assert!(core::mem::size_of::<UserContext>() == 768);
const _: () = assert!(core::mem::size_of::<SignalInfo>() == 128);
const _: () = assert!(core::mem::size_of::<SignalFrameData>() == 960);
const _: () = assert!(core::mem::align_of::<SignalFrameData>() == 64);
const _: () = assert!(core::mem::offset_of!(MachineContext, fpu) == 192);
const _: () = assert!(core::mem::offset_of!(UserContext, uc_mcontext) == 64);
const _: () = assert!(core::mem::offset_of!(SignalFrameData, siginfo) == 768);
