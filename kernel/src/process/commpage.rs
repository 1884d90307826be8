//! Per-process commpage trampoline table
//!
//! The commpage is a read-only page mapped into every process. It exports
//! small pieces of user code the kernel redirects threads to: the routine a
//! thread's outermost function returns into, and the signal trampoline that
//! calls the handler and then issues `sigreturn`.

use crate::arch::x86_64::validate::is_user_address;

/// Fixed commpage entries
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommpageSlot {
    /// Calls the thread-exit syscall with the returned value
    ThreadExit = 0,
    /// Runs the handler, then calls `sigreturn` with the context in RDI
    SignalTrampoline = 1,
}

const COMMPAGE_SLOTS: usize = 2;

/// Addresses of the commpage entries in one process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Commpage {
    entries: [u64; COMMPAGE_SLOTS],
}

impl Commpage {
    /// Table with no entries mapped.
    pub const fn empty() -> Self {
        Self {
            entries: [0; COMMPAGE_SLOTS],
        }
    }

    pub fn with_entry(mut self, slot: CommpageSlot, addr: u64) -> Self {
        self.entries[slot as usize] = addr;
        self
    }

    /// User address of `slot`, if mapped.
    pub fn resolve(&self, slot: CommpageSlot) -> Option<u64> {
        let addr = self.entries[slot as usize];
        (addr != 0 && is_user_address(addr)).then_some(addr)
    }
}
