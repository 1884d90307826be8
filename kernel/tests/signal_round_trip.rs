//! Signal delivery followed by sigreturn, as seen from the syscall boundary

mod common;

use common::*;
use ember_kernel::{
    arch::x86_64::{
        signal::SignalStack,
        trap::GeneralRegisters,
        validate::is_stack_aligned,
    },
    config::{MAX_SIGNAL_DEPTH, RED_ZONE_SIZE},
    process::{read_user, SaFlags, SignalAction},
    restore_signal_frame, setup_signal_frame,
    syscall::{handle_syscall, Syscall},
    SignalFrameData, SyscallError, TrapFrame,
};

const HANDLER: u64 = 0x40_8000;

fn busy_registers(sp: u64) -> GeneralRegisters {
    GeneralRegisters {
        rax: 0x1111,
        rbx: 0x2222,
        rcx: 0x3333,
        rdx: 0x4444,
        rsi: 0x5555,
        rdi: 0x6666,
        rbp: sp + 0x40,
        rsp: sp,
        r8: 8,
        r9: 9,
        r10: 10,
        r11: 11,
        r12: 12,
        r13: 13,
        r14: 14,
        r15: 15,
        rip: 0x40_1234,
        // IF, reserved bit, CF, ZF
        rflags: 0x202 | 0x1 | 0x40,
    }
}

fn deliver(
    cpu: &TestCpu,
    process: &ember_kernel::process::Process<TestAddressSpace>,
    thread: &ember_kernel::process::Thread,
    trap: &mut TrapFrame,
    flags: SaFlags,
) {
    let mut data = SignalFrameData::for_signal(2, 0, 0);
    setup_signal_frame(
        cpu,
        process,
        thread,
        trap,
        &SignalAction::new(HANDLER, flags),
        &mut data,
    )
    .unwrap();
}

/// State the trampoline is in when it issues sigreturn: the handler has
/// returned, so RSP is back above the return slot.
fn sigreturn_trap(delivered: &TrapFrame) -> TrapFrame {
    let mut trap = user_trap(delivered.regs.rsp + 8, SIGNAL_TRAMPOLINE + 0x10);
    trap.regs.rdi = delivered.regs.rdi;
    trap.regs.rax = Syscall::SigReturn as u64;
    trap
}

#[test]
fn unedited_frame_restores_interrupted_state() {
    let cpu = TestCpu::new();
    let process = process();
    let thread = thread();
    let mut trap = user_trap(0, 0);
    trap.regs = busy_registers(USER_STACK_TOP - 0x200);
    let original = trap.regs;

    deliver(&cpu, &process, &thread, &mut trap, SaFlags::SIGINFO);
    assert_eq!(thread.context.signal_depth(), 1);

    let mut ret = sigreturn_trap(&trap);
    handle_syscall(&cpu, &process, &thread, &mut ret);

    assert_eq!(ret.regs, original);
    assert_eq!(ret.cs, 0x33);
    assert_eq!(ret.ss, 0x2b);
    assert_eq!(thread.context.signal_depth(), 0);
}

#[test]
fn handler_edits_to_user_state_are_honoured() {
    let cpu = TestCpu::new();
    let process = process();
    let thread = thread();
    let mut trap = user_trap(0, 0);
    trap.regs = busy_registers(USER_STACK_TOP - 0x200);

    deliver(&cpu, &process, &thread, &mut trap, SaFlags::empty());

    let ctx = trap.regs.rdi;
    {
        let mut memory = process.memory_space.lock();
        let mut data: SignalFrameData = read_user(&*memory, ctx).unwrap();
        data.registers_mut().rip = 0x40_2000;
        data.registers_mut().rax = 99;
        // Try to clear IF and raise IOPL.
        data.registers_mut().rflags = 0x3000;
        ember_kernel::process::write_user(&mut *memory, ctx, &data).unwrap();
    }

    let mut ret = sigreturn_trap(&trap);
    let result = ember_kernel::syscall::sys_sigreturn(&cpu, &process, &thread, &mut ret);

    assert_eq!(result, Ok(99));
    assert_eq!(ret.regs.rip, 0x40_2000);
    assert_eq!(ret.regs.rflags, 0x202);
}

#[cfg(not(feature = "fatal-forged-context"))]
#[test]
fn forged_pointer_fails_the_syscall() {
    let cpu = TestCpu::new();
    let process = process();
    let thread = thread();
    let mut trap = user_trap(USER_STACK_TOP - 0x200, 0x40_1000);

    deliver(&cpu, &process, &thread, &mut trap, SaFlags::empty());

    let ctx = trap.regs.rdi;
    {
        let mut memory = process.memory_space.lock();
        let mut data: SignalFrameData = read_user(&*memory, ctx).unwrap();
        data.registers_mut().rsp = 0xFFFF_8000_0000_0000;
        ember_kernel::process::write_user(&mut *memory, ctx, &data).unwrap();
    }

    let mut ret = sigreturn_trap(&trap);
    handle_syscall(&cpu, &process, &thread, &mut ret);

    assert_eq!(ret.regs.rax, SyscallError::InvalidArgument.as_raw());
    assert_eq!(thread.context.signal_depth(), 1);
}

#[test]
fn sigreturn_with_bad_context_pointer_fails() {
    let cpu = TestCpu::new();
    let process = process();
    let thread = thread();
    let mut trap = user_trap(USER_STACK_TOP - 0x200, 0x40_1000);
    deliver(&cpu, &process, &thread, &mut trap, SaFlags::empty());

    let mut ret = sigreturn_trap(&trap);
    ret.regs.rdi = 0xFFFF_FFFF_FFFF_F000;
    handle_syscall(&cpu, &process, &thread, &mut ret);

    assert_eq!(ret.regs.rax, SyscallError::InvalidPointer.as_raw());
    assert_eq!(thread.context.signal_depth(), 1);
}

#[test]
fn nested_frames_stack_downward() {
    let cpu = TestCpu::new();
    let process = process();
    let thread = thread();
    let mut trap = user_trap(USER_STACK_TOP - 0x200, 0x40_1000);

    deliver(&cpu, &process, &thread, &mut trap, SaFlags::empty());
    let first_sp = trap.regs.rsp;
    let first_ctx = trap.regs.rdi;

    // Second signal arrives while the first handler runs.
    trap.regs.rip = HANDLER + 0x20;
    deliver(&cpu, &process, &thread, &mut trap, SaFlags::empty());

    assert!(is_stack_aligned(trap.regs.rsp));
    assert!(trap.regs.rsp < first_sp - RED_ZONE_SIZE);
    assert!(trap.regs.rdi + 960 <= first_sp - RED_ZONE_SIZE);
    assert_ne!(trap.regs.rdi, first_ctx);
    assert_eq!(thread.context.signal_depth(), 2);
    assert_eq!(thread.context.signal_context(), trap.regs.rdi);
}

#[test]
fn alternate_stack_round_trip() {
    let cpu = TestCpu::new();
    let process = process();
    let thread = thread();
    *thread.signal_stack.lock() = SignalStack::new(ALT_STACK_BASE, ALT_STACK_SIZE);
    let mut trap = user_trap(0, 0);
    trap.regs = busy_registers(USER_STACK_TOP - 0x200);
    let original = trap.regs;

    deliver(&cpu, &process, &thread, &mut trap, SaFlags::ONSTACK);
    let alt_stack = ALT_STACK_BASE..ALT_STACK_BASE + ALT_STACK_SIZE;
    assert!(alt_stack.contains(&trap.regs.rsp));

    let mut ret = sigreturn_trap(&trap);
    let rax = restore_signal_frame(
        &cpu,
        &thread,
        &mut ret,
        &read_user(&*process.memory_space.lock(), trap.regs.rdi).unwrap(),
    )
    .unwrap();

    assert_eq!(rax, original.rax);
    assert_eq!(ret.regs, original);
}

#[test]
fn depth_grows_to_the_limit() {
    let cpu = TestCpu::new();
    let process = process();
    let thread = thread();
    let mut trap = user_trap(USER_STACK_TOP - 0x200, 0x40_1000);

    for expected in 1..=MAX_SIGNAL_DEPTH {
        deliver(&cpu, &process, &thread, &mut trap, SaFlags::empty());
        assert_eq!(thread.context.signal_depth(), expected);
    }
}

#[test]
#[should_panic(expected = "signal nesting depth exceeded")]
fn delivery_past_the_limit_is_fatal() {
    let cpu = TestCpu::new();
    let process = process();
    let thread = thread();
    let mut trap = user_trap(USER_STACK_TOP - 0x200, 0x40_1000);

    for _ in 0..=MAX_SIGNAL_DEPTH {
        deliver(&cpu, &process, &thread, &mut trap, SaFlags::empty());
    }
}

#[test]
#[should_panic(expected = "signal return without delivery")]
fn restore_at_depth_zero_is_fatal() {
    let cpu = TestCpu::new();
    let thread = thread();
    let mut trap = user_trap(USER_STACK_TOP - 0x200, 0x40_1000);
    let data = SignalFrameData::default();
    let _ = restore_signal_frame(&cpu, &thread, &mut trap, &data);
}
