//! Host-side doubles for unit tests

use alloc::{string::String, vec, vec::Vec};
use core::{cell::Cell, ops::Range};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

use crate::{
    arch::x86_64::{
        context::init_thread_arch_state,
        cpu::CpuOps,
        fpu::{init_boot_template, FpuState, FCW_DEFAULT, MXCSR_DEFAULT},
        trap::{FpuSlot, TrapFrame, TrapKind},
    },
    error::{KernelError, KernelResult},
    process::{
        commpage::{Commpage, CommpageSlot},
        memory::UserMemory,
        pcb::{Process, ProcessId},
        thread::{Stack, Thread, ThreadId},
    },
};

pub const TEST_KERNEL_STACK_BASE: u64 = 0xFFFF_8000_0010_0000;
pub const TEST_KERNEL_STACK_SIZE: u64 = 0x4000;
pub const TEST_TRAMPOLINE: u64 = 0xFFFF_8000_0000_4000;

/// Backed user memory: `[TEST_USER_BASE, TEST_USER_BASE + TEST_USER_SIZE)`
pub const TEST_USER_BASE: u64 = 0x7000_0000;
pub const TEST_USER_SIZE: u64 = 0x4_0000;
pub const TEST_ALT_STACK_BASE: u64 = TEST_USER_BASE;
pub const TEST_ALT_STACK_SIZE: u64 = 0x8000;
pub const TEST_USER_STACK_BASE: u64 = TEST_USER_BASE + 0x1_0000;
pub const TEST_USER_STACK_TOP: u64 = TEST_USER_BASE + TEST_USER_SIZE;

pub const TEST_EXIT_TRAMPOLINE: u64 = 0x7FFF_FFFE_0000;
pub const TEST_SIGNAL_TRAMPOLINE: u64 = 0x7FFF_FFFE_0100;

/// Recording CPU
pub struct TestCpu {
    pub sp: u64,
    pub entropy: u64,
    /// FCW the simulated `fninit` produces
    pub reset_fcw: u16,
    pub fs_base: Cell<u64>,
}

impl TestCpu {
    pub fn new() -> Self {
        Self {
            sp: TEST_KERNEL_STACK_BASE + 0x2000,
            entropy: 0x1234_5678_9abc_def0,
            reset_fcw: FCW_DEFAULT,
            fs_base: Cell::new(0),
        }
    }
}

/// Unwind payload carrying the frame handed to `return_to_userland`
pub struct EnteredUserMode(pub TrapFrame);

impl CpuOps for TestCpu {
    fn stack_pointer(&self) -> u64 {
        self.sp
    }

    fn capture_reset_fpu_state(&self, area: &mut FpuState) {
        *area = FpuState::zeroed();
        area.set_control_word(self.reset_fcw);
        area.set_mxcsr(MXCSR_DEFAULT);
        area.set_mxcsr_mask(0xFFFF);
        // Stale register contents the template must not inherit.
        area.as_bytes_mut()[32..416].fill(0xAA);
    }

    fn write_fs_base(&self, base: u64) {
        self.fs_base.set(base);
    }

    fn entropy(&self) -> u64 {
        self.entropy
    }

    fn kernel_thread_trampoline(&self) -> u64 {
        TEST_TRAMPOLINE
    }

    fn return_to_userland(&self, _thread: &Thread, frame: &TrapFrame) -> ! {
        std::panic::panic_any(EnteredUserMode(frame.clone()))
    }
}

/// User address space backed by a vector
pub struct TestAddressSpace {
    base: u64,
    bytes: Vec<u8>,
}

impl TestAddressSpace {
    pub fn new() -> Self {
        Self {
            base: TEST_USER_BASE,
            bytes: vec![0; TEST_USER_SIZE as usize],
        }
    }

    fn range(&self, addr: u64, len: usize) -> KernelResult<Range<usize>> {
        let start = addr
            .checked_sub(self.base)
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

pub fn test_process() -> Process<TestAddressSpace> {
    let commpage = Commpage::empty()
        .with_entry(CommpageSlot::ThreadExit, TEST_EXIT_TRAMPOLINE)
        .with_entry(CommpageSlot::SignalTrampoline, TEST_SIGNAL_TRAMPOLINE);
    Process::new(
        ProcessId(1),
        String::from("test"),
        commpage,
        TestAddressSpace::new(),
    )
}

/// Thread with initialized arch state; publishes the boot template if no
/// test has yet.
pub fn test_thread() -> Thread {
    init_boot_template(&TestCpu::new());
    let thread = Thread::new(
        ThreadId(1),
        ProcessId(1),
        String::from("test-thread"),
        Stack::new(TEST_KERNEL_STACK_BASE, TEST_KERNEL_STACK_SIZE),
        Stack::new(
            TEST_USER_STACK_BASE,
            TEST_USER_STACK_TOP - TEST_USER_STACK_BASE,
        ),
    );
    init_thread_arch_state(&thread);
    thread
}

/// Syscall trap frame from user mode with the FPU state in the thread.
pub fn user_trap(sp: u64, ip: u64) -> TrapFrame {
    let mut trap = TrapFrame::user(TrapKind::Syscall);
    trap.regs.rsp = sp;
    trap.regs.rip = ip;
    trap.fpu = FpuSlot::Thread;
    trap
}

/// Run `f`, which must end in `return_to_userland`, and return the frame
/// it entered user mode with.
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
