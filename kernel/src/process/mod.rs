//! Generic process and thread objects seen by the architecture layer
//!
//! Only the parts of the process model the x86_64 context code touches are
//! defined here: identity, stack bounds, the per-thread architecture
//! context, the commpage and access to user memory.

pub mod commpage;
pub mod memory;
pub mod pcb;
pub mod signal;
pub mod thread;

pub use commpage::{Commpage, CommpageSlot};
pub use memory::{read_user, write_user, UserMemory};
pub use pcb::{Process, ProcessId};
pub use signal::{SaFlags, SignalAction};
pub use thread::{Stack, Thread, ThreadId};
