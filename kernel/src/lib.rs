//! Ember kernel: x86_64 thread-context and signal-frame layer
//!
//! This library owns the architecture-specific half of thread management:
//!
//! - the boot-time FPU/SSE reset template and per-thread context store,
//! - kernel-thread stack bootstrap and the first transition to user mode,
//! - construction and restoration of user-space signal frames.
//!
//! Scheduling, page tables, and the architecture-independent signal policy
//! live elsewhere; they reach this crate through the types in [`process`]
//! and the [`arch::x86_64::cpu::CpuOps`] seam.
//!
//! The crate is `no_std`. Unit tests build against `std` on the host so the
//! pure logic can be exercised with `cargo test`.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod error;
pub mod process;
pub mod raii;
pub mod syscall;

#[cfg(test)]
mod testing;

pub use arch::x86_64::{
    context::{
        init_kernel_thread_stack, init_thread_arch_state, record_syscall_entry,
        set_thread_local_base, StackView, ThreadContext,
    },
    cpu::CpuOps,
    fpu::{boot_template, init_boot_template, FpuState},
    signal::{restore_signal_frame, setup_signal_frame, SignalFrameData},
    trap::{TrapFrame, TrapKind},
    usermode::enter_userspace,
};
pub use error::{KernelError, KernelResult, SyscallError};
