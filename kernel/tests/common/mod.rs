//! Common test utilities for the ember kernel integration tests

#![allow(dead_code)]

use std::{
    cell::Cell,
    ops::Range,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
};

use ember_kernel::{
    arch::x86_64::{
        fpu::{FCW_DEFAULT, MXCSR_DEFAULT},
        trap::{FpuSlot, TrapKind},
    },
    init_boot_template, init_thread_arch_state,
    process::{Commpage, CommpageSlot, Process, ProcessId, Stack, Thread, ThreadId, UserMemory},
    CpuOps, FpuState, KernelError, KernelResult, TrapFrame,
};

pub const KERNEL_STACK_BASE: u64 = 0xFFFF_8000_0020_0000;
pub const KERNEL_STACK_SIZE: u64 = 0x4000;

pub const USER_MEMORY_BASE: u64 = 0x4000_0000;
pub const USER_MEMORY_SIZE: u64 = 0x8_0000;
pub const ALT_STACK_BASE: u64 = USER_MEMORY_BASE;
pub const ALT_STACK_SIZE: u64 = 0x1_0000;
pub const USER_STACK_BASE: u64 = USER_MEMORY_BASE + 0x2_0000;
pub const USER_STACK_TOP: u64 = USER_MEMORY_BASE + USER_MEMORY_SIZE;

pub const EXIT_TRAMPOLINE: u64 = 0x7FFF_FFFE_E000;
pub const SIGNAL_TRAMPOLINE: u64 = 0x7FFF_FFFE_E040;

pub struct TestCpu {
    pub entropy: u64,
    pub fs_base: Cell<u64>,
}

impl TestCpu {
    pub fn new() -> Self {
        Self {
            entropy: 0xfeed_5eed,
            fs_base: Cell::new(0),
        }
    }
}

pub struct EnteredUserMode(pub TrapFrame);

impl CpuOps for TestCpu {
    fn stack_pointer(&self) -> u64 {
        KERNEL_STACK_BASE + KERNEL_STACK_SIZE / 2
    }

    fn capture_reset_fpu_state(&self, area: &mut FpuState) {
        *area = FpuState::zeroed();
        area.set_control_word(FCW_DEFAULT);
        area.set_mxcsr(MXCSR_DEFAULT);
        area.set_mxcsr_mask(0xFFFF);
    }

    fn write_fs_base(&self, base: u64) {
        self.fs_base.set(base);
    }

    fn entropy(&self) -> u64 {
        self.entropy
    }

    fn kernel_thread_trampoline(&self) -> u64 {
        0xFFFF_8000_0000_8000
    }

    fn return_to_userland(&self, _thread: &Thread, frame: &TrapFrame) -> ! {
        std::panic::panic_any(EnteredUserMode(frame.clone()))
    }
}

pub struct TestAddressSpace {
    bytes: Vec<u8>,
}

impl TestAddressSpace {
    pub fn new() -> Self {
        Self {
            bytes: vec![0; USER_MEMORY_SIZE as usize],
        }
    }

    fn range(&self, addr: u64, len: usize) -> KernelResult<Range<usize>> {
        let start = addr
            .checked_sub(USER_MEMORY_BASE)
            .ok_or(KernelError::UnmappedMemory { addr })? as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(KernelError::UnmappedMemory { addr })?;
        Ok(start..end)
    }
}

impl UserMemory for TestAddressSpace {
    fn copy_to_user(&mut self, addr: u64, bytes: &[u8]) -> KernelResult<()> {
        let range = self.range(addr, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }

    fn copy_from_user(&self, addr: u64, buf: &mut [u8]) -> KernelResult<()> {
        let range = self.range(addr, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }
}

pub fn process() -> Process<TestAddressSpace> {
    let commpage = Commpage::empty()
        .with_entry(CommpageSlot::ThreadExit, EXIT_TRAMPOLINE)
        .with_entry(CommpageSlot::SignalTrampoline, SIGNAL_TRAMPOLINE);
    let memory = TestAddressSpace::new();
    Process::new(ProcessId(7), "init".into(), commpage, memory)
}

pub fn thread() -> Thread {
    init_boot_template(&TestCpu::new());
    let thread = Thread::new(
        ThreadId(70),
        ProcessId(7),
        "main".into(),
        Stack::new(KERNEL_STACK_BASE, KERNEL_STACK_SIZE),
        Stack::new(USER_STACK_BASE, USER_STACK_TOP - USER_STACK_BASE),
    );
    init_thread_arch_state(&thread);
    thread
}

pub fn user_trap(sp: u64, ip: u64) -> TrapFrame {
    let mut trap = TrapFrame::user(TrapKind::Interrupt);
    trap.regs.rsp = sp;
    trap.regs.rip = ip;
    trap.fpu = FpuSlot::Thread;
    trap
}

pub fn catch_user_entry<F: FnOnce()>(f: F) -> TrapFrame {
    let payload = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => panic!("user entry returned"),
        Err(payload) => payload,
    };
    match payload.downcast::<EnteredUserMode>() {
        Ok(entered) => entered.0,
        Err(other) => resume_unwind(other),
    }
}
