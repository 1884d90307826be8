//! x86_64 thread context, user entry and signal frames

pub mod context;
pub mod cpu;
pub mod diag;
pub mod fpu;
pub mod signal;
pub mod trap;
pub mod usermode;
pub mod validate;

use ::x86_64::{structures::gdt::SegmentSelector, PrivilegeLevel};

/// Kernel code segment (GDT index 1)
pub const KERNEL_CS: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0);
/// Kernel data segment (GDT index 2)
pub const KERNEL_DS: SegmentSelector = SegmentSelector::new(2, PrivilegeLevel::Ring0);
/// User data segment (GDT index 5, RPL 3), 0x2B
pub const USER_DS: SegmentSelector = SegmentSelector::new(5, PrivilegeLevel::Ring3);
/// User code segment (GDT index 6, RPL 3), 0x33
pub const USER_CS: SegmentSelector = SegmentSelector::new(6, PrivilegeLevel::Ring3);

const _: () = assert!(USER_CS.0 == 0x33 && USER_DS.0 == 0x2B);
