//! The walk cursor.

use crate::target_method::TargetMethod;
use crate::trap::TrapState;
use sable_core::Address;
use std::sync::Arc;

/// Mutable position of one in-progress stack walk.
///
/// Exactly one cursor exists per walk. It is owned and advanced only by the
/// walker; consumers see it read-only during their callback. The address
/// triple always denotes a real machine state reachable by the walk, and
/// across one walk it moves monotonically outward toward the stack base.
#[derive(Clone)]
pub struct Cursor {
    ip: Address,
    sp: Address,
    fp: Address,
    method: Arc<dyn TargetMethod>,
    is_top_frame: bool,
    trap: Option<TrapState>,
}

impl Cursor {
    /// Creates the cursor for the innermost frame of a walk.
    pub fn top(ip: Address, sp: Address, fp: Address, method: Arc<dyn TargetMethod>) -> Self {
        Self {
            ip,
            sp,
            fp,
            method,
            is_top_frame: true,
            trap: None,
        }
    }

    /// Attaches the trap state of the frame this cursor denotes. A trap
    /// belongs to exactly the frame it interrupted; advancing clears it.
    pub fn with_trap(mut self, trap: Option<TrapState>) -> Self {
        self.trap = trap;
        self
    }

    /// Current instruction pointer.
    #[inline]
    pub fn ip(&self) -> Address {
        self.ip
    }

    /// Current stack pointer.
    #[inline]
    pub fn sp(&self) -> Address {
        self.sp
    }

    /// Current frame pointer.
    #[inline]
    pub fn fp(&self) -> Address {
        self.fp
    }

    /// The compiled method owning the current instruction pointer.
    #[inline]
    pub fn method(&self) -> &Arc<dyn TargetMethod> {
        &self.method
    }

    /// True only while the cursor denotes the innermost frame.
    #[inline]
    pub fn is_top_frame(&self) -> bool {
        self.is_top_frame
    }

    /// Trap state of the frame this cursor denotes, if a hardware trap
    /// interrupted it.
    #[inline]
    pub fn trap(&self) -> Option<TrapState> {
        self.trap
    }

    /// Moves the cursor to the caller's frame. After the first advancement
    /// the cursor is no longer the top frame, and any trap state stays
    /// behind with the frame it interrupted.
    pub(crate) fn advance(
        &mut self,
        ip: Address,
        sp: Address,
        fp: Address,
        method: Arc<dyn TargetMethod>,
    ) {
        self.ip = ip;
        self.sp = sp;
        self.fp = fp;
        self.method = method;
        self.is_top_frame = false;
        self.trap = None;
    }
}
