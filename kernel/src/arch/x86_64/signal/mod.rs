//! Signal frames on user stacks
//!
//! Delivery writes a [`SignalFrameData`] image below the interrupted stack
//! pointer (or on the alternate stack) and redirects the thread to the
//! commpage signal trampoline. The trampoline calls the handler and then
//! `sigreturn`, which reads the possibly edited image back.

pub mod deliver;
pub mod frame;
pub mod restore;
pub mod stack;

pub use deliver::setup_signal_frame;
pub use frame::{
    MachineContext, SignalFrameData, SignalInfo, SignalStack, SignalStackFlags, UserContext,
};
pub use restore::restore_signal_frame;
pub use stack::{place_signal_frame, SignalStackPlacement};
