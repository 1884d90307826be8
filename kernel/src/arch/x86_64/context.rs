//! Per-thread architecture state
//!
//! [`ThreadContext`] is the x86_64 part of a thread control block: the
//! thread's FXSAVE image, the stack pointers recorded at kernel entry, the
//! TLS base and the signal bookkeeping. The functions below bootstrap it for
//! new threads.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use spin::{Mutex, MutexGuard};

use super::{
    cpu::CpuOps,
    diag::{fatal, FatalError},
    fpu::{boot_template, FpuState},
    trap::TrapFrame,
    validate::check_kernel_stack,
};
use crate::{
    config::STACK_ALIGNMENT,
    error::{KernelError, KernelResult},
    process::thread::Thread,
};

/// Register state saved across kernel entries and context switches
#[derive(Debug, Clone, Copy)]
pub struct SavedState {
    /// Kernel RSP to resume the thread at
    pub kernel_sp: u64,
    /// Kernel RSP at the most recent syscall entry
    pub syscall_sp: u64,
    /// User RSP at the most recent syscall entry, or the initial user stack
    pub user_sp: u64,
    /// FPU/SSE state while the thread is not running
    pub fpu: FpuState,
    /// FS base for thread-local storage
    pub tls_base: u64,
    /// First instruction the thread executes
    pub first_ip: u64,
}

impl SavedState {
    const fn empty() -> Self {
        Self {
            kernel_sp: 0,
            syscall_sp: 0,
            user_sp: 0,
            fpu: FpuState::zeroed(),
            tls_base: 0,
            first_ip: 0,
        }
    }
}

/// x86_64 thread context
pub struct ThreadContext {
    saved: Mutex<SavedState>,
    /// Signal frames currently live on the thread's stacks
    signal_depth: AtomicU32,
    /// User address of the most recently delivered signal context
    signal_context: AtomicU64,
}

impl ThreadContext {
    /// Blank context. [`init_thread_arch_state`] must run before the thread
    /// is scheduled.
    pub const fn new() -> Self {
        Self {
            saved: Mutex::new(SavedState::empty()),
            signal_depth: AtomicU32::new(0),
            signal_context: AtomicU64::new(0),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SavedState> {
        self.saved.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, SavedState>> {
        self.saved.try_lock()
    }

    pub fn signal_depth(&self) -> u32 {
        self.signal_depth.load(Ordering::Acquire)
    }

    pub(crate) fn signal_depth_counter(&self) -> &AtomicU32 {
        &self.signal_depth
    }

    /// Address of the last delivered signal context, 0 if none.
    pub fn signal_context(&self) -> u64 {
        self.signal_context.load(Ordering::Acquire)
    }

    pub(crate) fn set_signal_context(&self, addr: u64) {
        self.signal_context.store(addr, Ordering::Release);
    }

    pub fn tls_base(&self) -> u64 {
        self.saved.lock().tls_base
    }

    pub fn set_tls_base(&self, base: u64) {
        self.saved.lock().tls_base = base;
    }
}

impl Default for ThreadContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Reset `thread`'s architecture state for first use.
///
/// The FPU image is copied from the boot template, which must already be
/// published.
pub fn init_thread_arch_state(thread: &Thread) {
    let template = boot_template();
    let context = &thread.context;
    {
        let mut saved = context.lock();
        saved.fpu = *template;
        saved.tls_base = 0;
        saved.first_ip = 0;
    }
    context.signal_depth.store(0, Ordering::Release);
    context.signal_context.store(0, Ordering::Release);
}

/// Load `thread`'s TLS base into FS. Called on every switch to the thread.
pub fn set_thread_local_base<C: CpuOps + ?Sized>(cpu: &C, thread: &Thread) {
    cpu.write_fs_base(thread.context.tls_base());
}

/// Record the stack pointers of a syscall entry. `frame` is the trap frame
/// the entry stub built on the kernel stack, so its address is the kernel
/// SP of the syscall.
pub fn record_syscall_entry(thread: &Thread, frame: &TrapFrame) {
    let mut saved = thread.context.lock();
    saved.syscall_sp = frame as *const TrapFrame as u64;
    saved.user_sp = frame.regs.rsp;
}

/// Downward-growing, bounds-checked window onto stack memory
pub struct StackView<'a> {
    memory: &'a mut [u8],
    base: u64,
    sp: u64,
}

impl<'a> StackView<'a> {
    /// View `memory`, which lives at address `base`. The stack pointer
    /// starts at the top.
    pub fn new(memory: &'a mut [u8], base: u64) -> Self {
        let sp = base + memory.len() as u64;
        Self { memory, base, sp }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn top(&self) -> u64 {
        self.base + self.memory.len() as u64
    }

    pub fn stack_pointer(&self) -> u64 {
        self.sp
    }

    pub fn align_down(&mut self, align: u64) {
        self.sp &= !(align - 1);
    }

    pub fn push_u64(&mut self, value: u64) -> KernelResult<()> {
        let sp = self
            .sp
            .checked_sub(8)
            .filter(|&sp| sp >= self.base)
            .ok_or(KernelError::InvalidAddress { addr: self.sp })?;
        let offset = (sp - self.base) as usize;
        self.memory[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        self.sp = sp;
        Ok(())
    }

    /// Read back the word at `addr`.
    pub fn read_u64(&self, addr: u64) -> Option<u64> {
        let offset = addr.checked_sub(self.base)? as usize;
        let bytes = self.memory.get(offset..offset.checked_add(8)?)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Some(u64::from_le_bytes(raw))
    }
}

/// Seed a new kernel thread's stack so the first switch to it lands in the
/// kernel thread entry trampoline.
///
/// Layout from the (16-byte aligned) top down: `data`, `entry`, then the
/// thread pointer the trampoline uses to finish setup.
pub fn init_kernel_thread_stack<C: CpuOps + ?Sized>(
    cpu: &C,
    thread: &Thread,
    stack: &mut StackView<'_>,
    entry: u64,
    data: u64,
) {
    let kstack = &thread.kernel_stack;
    if stack.base() < kstack.base || stack.top() > kstack.top() {
        fatal(
            FatalError::ForeignKernelStack {
                base: stack.base(),
                top: stack.top(),
            },
            Some(thread),
            None,
        );
    }

    stack.align_down(STACK_ALIGNMENT);
    let thread_ptr = thread as *const Thread as u64;
    for word in [data, entry, thread_ptr] {
        if stack.push_u64(word).is_err() {
            fatal(
                FatalError::KernelStackTooSmall { base: stack.base() },
                Some(thread),
                None,
            );
        }
    }

    let sp = stack.stack_pointer();
    check_kernel_stack(thread, sp);

    let mut saved = thread.context.lock();
    saved.kernel_sp = sp;
    saved.first_ip = cpu.kernel_thread_trampoline();
    log::debug!(
        "[THREAD] Kernel stack for thread {} ready: sp=0x{:x} entry=0x{:x}",
        thread.tid,
        sp,
        entry
    );
}
