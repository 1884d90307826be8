//! Compile-time configuration for the thread-context and signal layer
//!
//! Everything here is an ABI or layout constant shared with user space or
//! with the low-level entry code; changing a value changes the contract.
//! Behavioural switches are Cargo features (`aslr`,
//! `fatal-forged-context`), queried through the helpers at the bottom.

/// Lowest user-space address. The first 64 KiB stay unmapped so that null
/// and near-null dereferences always fault.
pub const USER_BASE: u64 = 0x0000_0000_0001_0000;

/// Size of the user address window starting at [`USER_BASE`].
pub const USER_SIZE: u64 = 0x0000_7FFF_FFFF_0000 - USER_BASE;

/// First address past the user window.
pub const USER_END: u64 = USER_BASE + USER_SIZE;

/// Stack alignment required at a call boundary (SysV AMD64).
pub const STACK_ALIGNMENT: u64 = 16;

/// Size of one return-address slot.
pub const RETURN_SLOT_SIZE: u64 = 8;

/// Scratch area below the stack pointer that leaf functions may use
/// without adjusting RSP.
pub const RED_ZONE_SIZE: u64 = 128;

/// Alignment of the user-visible signal context (matches the FXSAVE block
/// alignment inside it).
pub const SIGNAL_CONTEXT_ALIGNMENT: u64 = 64;

/// Bytes at the bottom of every kernel stack that must never be reached.
pub const KERNEL_STACK_RESERVE: u64 = 512;

/// Maximum number of signal frames that may be live on one thread.
pub const MAX_SIGNAL_DEPTH: u32 = 32;

/// Upper bound (exclusive) of the random offset applied to a new thread's
/// initial user stack pointer.
pub const STACK_ASLR_MAX: u64 = 16 * 1024;

/// Smallest alternate signal stack accepted by `sigaltstack`.
pub const MIN_SIGNAL_STACK_SIZE: u64 = 4096;

/// Whether initial user stack pointers are randomized.
#[inline]
pub const fn aslr_enabled() -> bool {
    cfg!(feature = "aslr")
}

/// Whether a forged sigreturn context halts the kernel instead of failing
/// the offending system call.
#[inline]
pub const fn forged_context_is_fatal() -> bool {
    cfg!(feature = "fatal-forged-context")
}

const _: () = assert!(USER_END == 0x0000_7FFF_FFFF_0000);
const _: () = assert!(STACK_ASLR_MAX.is_power_of_two());
const _: () = assert!(SIGNAL_CONTEXT_ALIGNMENT % STACK_ALIGNMENT == 0);
