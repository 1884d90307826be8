//! Process Control Block

use alloc::string::String;

use spin::Mutex;

use super::{commpage::Commpage, memory::UserMemory};

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u64);

impl core::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state needed for thread entry and signal delivery
pub struct Process<M: UserMemory> {
    pub pid: ProcessId,
    pub name: String,
    /// Trampolines mapped into this process
    pub commpage: Commpage,
    /// User address space
    pub memory_space: Mutex<M>,
}

impl<M: UserMemory> Process<M> {
    pub fn new(pid: ProcessId, name: String, commpage: Commpage, memory: M) -> Self {
        Self {
            pid,
            name,
            commpage,
            memory_space: Mutex::new(memory),
        }
    }
}
