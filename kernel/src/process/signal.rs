//! Signal disposition as chosen by the generic signal layer

use bitflags::bitflags;

bitflags! {
    /// `sa_flags` bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SaFlags: u32 {
        /// Do not generate SIGCHLD when children stop.
        const NOCLDSTOP = 0x0000_0001;
        /// Do not create zombie children.
        const NOCLDWAIT = 0x0000_0002;
        /// Handler takes (signo, siginfo, ucontext).
        const SIGINFO = 0x0000_0004;
        /// Run the handler on the alternate signal stack.
        const ONSTACK = 0x0800_0000;
        /// Restart interrupted system calls.
        const RESTART = 0x1000_0000;
        /// Do not block the signal while its handler runs.
        const NODEFER = 0x4000_0000;
        /// Reset to the default disposition on entry.
        const RESETHAND = 0x8000_0000;
    }
}

/// Handler to run for a signal being delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalAction {
    /// User address of the handler
    pub handler: u64,
    pub flags: SaFlags,
    /// Signals blocked while the handler runs
    pub mask: u64,
}

impl SignalAction {
    pub fn new(handler: u64, flags: SaFlags) -> Self {
        Self {
            handler,
            flags,
            mask: 0,
        }
    }

    pub fn wants_alternate_stack(&self) -> bool {
        self.flags.contains(SaFlags::ONSTACK)
    }
}
