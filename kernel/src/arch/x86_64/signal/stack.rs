//! Choosing where a signal frame goes

use super::super::{
    diag::{fatal, FatalError},
    trap::TrapFrame,
    validate::{is_stack_aligned, is_user_range},
};
use crate::{
    config::{RED_ZONE_SIZE, RETURN_SLOT_SIZE, SIGNAL_CONTEXT_ALIGNMENT, USER_BASE},
    process::thread::Thread,
};

/// Result of placing a signal frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalStackPlacement {
    /// Stack pointer the handler starts with; points at the return slot
    pub stack_pointer: u64,
    /// Address of the signal context, directly above the return slot
    pub context_address: u64,
    /// Frame was put on the alternate signal stack
    pub on_alternate_stack: bool,
}

/// Reserve `required` bytes (context plus return slot) for a signal frame.
///
/// The frame goes on the alternate stack when `use_alt_stack` is set, the
/// stack is registered and the thread is not already running on it.
/// Otherwise it goes below the red zone of the interrupted stack pointer.
/// Running out of room is fatal.
pub fn place_signal_frame(
    thread: &Thread,
    trap: &TrapFrame,
    use_alt_stack: bool,
    required: u64,
) -> SignalStackPlacement {
    let sp = trap.regs.rsp;
    let alt = thread.alternate_stack();
    let already_on_alt = alt.contains(sp);

    let (top, floor, on_alternate_stack) = if use_alt_stack && alt.is_enabled() && !already_on_alt
    {
        (alt.top(), alt.ss_sp, true)
    } else if already_on_alt {
        (sp, alt.ss_sp, true)
    } else if thread.user_stack.contains(sp) {
        (sp, thread.user_stack.base, false)
    } else {
        (sp, USER_BASE, false)
    };

    let context_size = required.saturating_sub(RETURN_SLOT_SIZE);
    let slot = top
        .checked_sub(RED_ZONE_SIZE + context_size)
        .map(|addr| addr & !(SIGNAL_CONTEXT_ALIGNMENT - 1))
        .and_then(|ctx| {
            ctx.checked_sub(RETURN_SLOT_SIZE)
                .filter(|&sp| sp >= floor)
                .map(|sp| (ctx, sp))
        });
    let (context_address, stack_pointer) = match slot {
        Some(slot) => slot,
        None => fatal(
            FatalError::SignalStackExhausted {
                top,
                floor,
                required,
            },
            Some(thread),
            Some(trap),
        ),
    };

    if !is_user_range(stack_pointer, required) {
        fatal(
            FatalError::InvalidUserPointer {
                what: "signal frame",
                addr: stack_pointer,
            },
            Some(thread),
            Some(trap),
        );
    }
    if !is_stack_aligned(stack_pointer) {
        fatal(
            FatalError::MisalignedStack { sp: stack_pointer },
            Some(thread),
            Some(trap),
        );
    }

    SignalStackPlacement {
        stack_pointer,
        context_address,
        on_alternate_stack,
    }
}
