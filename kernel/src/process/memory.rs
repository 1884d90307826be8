//! Access to user memory
//!
//! [`UserMemory`] is implemented by whatever owns a process's address
//! space. [`write_user`] / [`read_user`] add the user-window check and move
//! plain-data values across the boundary as bytes.

use core::mem::size_of;

use crate::{
    arch::x86_64::validate::is_user_range,
    error::{KernelError, KernelResult},
};

/// Byte-level copies between kernel buffers and one user address space
pub trait UserMemory {
    /// Copy `bytes` to user address `addr`.
    fn copy_to_user(&mut self, addr: u64, bytes: &[u8]) -> KernelResult<()>;

    /// Fill `buf` from user address `addr`.
    fn copy_from_user(&self, addr: u64, buf: &mut [u8]) -> KernelResult<()>;
}

/// Types that can be copied to and from user memory as raw bytes.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` (or a primitive), contain no padding
/// bytes and accept every bit pattern as a valid value.
pub unsafe trait Pod: Copy + 'static {}

// SAFETY: Primitive integer, no padding, every bit pattern valid.
unsafe impl Pod for u64 {}

/// View `value` as its bytes.
pub fn bytes_of<T: Pod>(value: &T) -> &[u8] {
    // SAFETY: `T: Pod` has no padding, so all `size_of::<T>()` bytes behind
    // the reference are initialized.
    unsafe { core::slice::from_raw_parts(value as *const T as *const u8, size_of::<T>()) }
}

/// View `value` as mutable bytes.
pub fn bytes_of_mut<T: Pod>(value: &mut T) -> &mut [u8] {
    // SAFETY: `T: Pod` has no padding and accepts any bit pattern, so any
    // bytes written through the slice leave a valid `T`.
    unsafe { core::slice::from_raw_parts_mut(value as *mut T as *mut u8, size_of::<T>()) }
}

/// Copy `value` to `addr` after checking the destination range.
pub fn write_user<M, T>(memory: &mut M, addr: u64, value: &T) -> KernelResult<()>
where
    M: UserMemory + ?Sized,
    T: Pod,
{
    let size = size_of::<T>() as u64;
    if !is_user_range(addr, size) {
        return Err(KernelError::InvalidUserRange { addr, size });
    }
    memory.copy_to_user(addr, bytes_of(value))
}

/// Copy a `T` from `addr` after checking the source range.
pub fn read_user<M, T>(memory: &M, addr: u64) -> KernelResult<T>
where
    M: UserMemory + ?Sized,
    T: Pod,
{
    let size = size_of::<T>() as u64;
    if !is_user_range(addr, size) {
        return Err(KernelError::InvalidUserRange { addr, size });
    }
    // SAFETY: `T: Pod` accepts the all-zero bit pattern.
    let mut value: T = unsafe { core::mem::zeroed() };
    memory.copy_from_user(addr, bytes_of_mut(&mut value))?;
    Ok(value)
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub use self::hw::CurrentAddressSpace;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod hw {
    use super::UserMemory;
    use crate::{
        arch::x86_64::validate::is_user_range,
        error::{KernelError, KernelResult},
    };

    /// The address space loaded in CR3 on this CPU.
    ///
    /// Only valid while the owning process is the current one. A fault on an
    /// unmapped page is resolved (or turned into a signal) by the page-fault
    /// handler.
    pub struct CurrentAddressSpace;

    impl UserMemory for CurrentAddressSpace {
        fn copy_to_user(&mut self, addr: u64, bytes: &[u8]) -> KernelResult<()> {
            if !is_user_range(addr, bytes.len() as u64) {
                return Err(KernelError::InvalidUserRange {
                    addr,
                    size: bytes.len() as u64,
                });
            }
            // SAFETY: The destination range was checked to lie in the user
            // window of the current address space and does not overlap any
            // kernel buffer.
            unsafe {
                core::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
            }
            Ok(())
        }

        fn copy_from_user(&self, addr: u64, buf: &mut [u8]) -> KernelResult<()> {
            if !is_user_range(addr, buf.len() as u64) {
                return Err(KernelError::InvalidUserRange {
                    addr,
                    size: buf.len() as u64,
                });
            }
            // SAFETY: The source range was checked to lie in the user window
            // of the current address space; `buf` is a kernel buffer.
            unsafe {
                core::ptr::copy_nonoverlapping(addr as *const u8, buf.as_mut_ptr(), buf.len());
            }
            Ok(())
        }
    }
}
