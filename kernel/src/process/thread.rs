//! Thread management
//!
//! Threads are the unit of execution within a process. Each thread has its
//! own kernel stack, user stack and CPU context but shares memory with its
//! process.

use alloc::string::String;

use spin::Mutex;

use super::ProcessId;
use crate::arch::x86_64::{context::ThreadContext, signal::SignalStack};

/// Thread ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bounds of a stack region `[base, base + size)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stack {
    pub base: u64,
    pub size: u64,
}

impl Stack {
    pub const fn new(base: u64, size: u64) -> Self {
        Self { base, size }
    }

    /// First address past the stack.
    pub const fn top(&self) -> u64 {
        self.base + self.size
    }

    /// True if `sp` points into the stack. The top itself counts, since an
    /// empty stack has its pointer there.
    pub fn contains(&self, sp: u64) -> bool {
        sp > self.base && sp <= self.top()
    }
}

/// Thread control block
pub struct Thread {
    pub tid: ThreadId,
    /// Owning process
    pub pid: ProcessId,
    pub name: String,
    pub kernel_stack: Stack,
    pub user_stack: Stack,
    /// Registered alternate signal stack
    pub signal_stack: Mutex<SignalStack>,
    /// Architecture-specific context
    pub context: ThreadContext,
}

impl Thread {
    /// Create a thread with a blank context and no alternate signal stack.
    pub fn new(
        tid: ThreadId,
        pid: ProcessId,
        name: String,
        kernel_stack: Stack,
        user_stack: Stack,
    ) -> Self {
        Self {
            tid,
            pid,
            name,
            kernel_stack,
            user_stack,
            signal_stack: Mutex::new(SignalStack::disabled()),
            context: ThreadContext::new(),
        }
    }

    /// Snapshot of the alternate signal stack descriptor.
    pub fn alternate_stack(&self) -> SignalStack {
        *self.signal_stack.lock()
    }
}
