//! Trap state recorded when a hardware trap interrupts compiled code.

use sable_core::Address;

/// Kind of hardware trap that interrupted a frame.
///
/// Only the stack fault is special-cased by this layer: the stack-banging
/// instruction that raises it sits in a prologue that precedes any live
/// reference, so reference-map preparation skips the frame entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapKind {
    /// Stack-overflow guard-page fault.
    StackFault,

    /// Any other trap, identified by the platform's trap number.
    Other(u32),
}

impl TrapKind {
    /// Returns true for the stack-overflow guard-page fault.
    #[inline]
    pub const fn is_stack_fault(self) -> bool {
        matches!(self, TrapKind::StackFault)
    }
}

/// Machine state saved when a trap interrupted the frame being walked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrapState {
    /// Which trap fired.
    pub kind: TrapKind,

    /// Caller instruction pointer recorded at trap time. Consulted when the
    /// return address has not yet been stored to its stack slot.
    pub caller_ip: Address,
}

impl TrapState {
    /// Creates a new trap state.
    #[inline]
    pub const fn new(kind: TrapKind, caller_ip: Address) -> Self {
        Self { kind, caller_ip }
    }
}
