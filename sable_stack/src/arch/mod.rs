//! Architecture backends.
//!
//! The walk protocol is generic; everything that depends on instruction
//! encodings, frame layouts, or register conventions sits behind
//! [`ArchBackend`]. Two backends exist: [`amd64`], which classifies frame
//! state from opcode bytes, and [`sparc`], which classifies from address
//! ranges and deals in register windows and stack bias.

pub mod amd64;
pub mod sparc;

use crate::access::StackAccess;
use crate::cursor::Cursor;
use crate::frame_state::FrameState;
use crate::purpose::Purpose;
use crate::unwind::{StackUnwindingContext, UnwindOperation};
use sable_core::Address;

/// The caller's machine state, as recovered from the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallerFrame {
    /// Caller's instruction pointer; zero is the stack-root sentinel.
    pub ip: Address,

    /// Caller's stack pointer.
    pub sp: Address,

    /// Caller's frame pointer.
    pub fp: Address,
}

/// Geometry of an adapter frame plus the caller state recovered through it.
/// Recomputed per query from the method's layout facts, never persisted.
#[derive(Clone, Copy, Debug)]
pub struct AdapterFrameInfo {
    /// The adapter's frame pointer.
    pub frame_pointer: Address,

    /// The adapter's stack pointer.
    pub stack_pointer: Address,

    /// The adapter's frame size in bytes.
    pub frame_size: usize,

    /// The caller of the adapter.
    pub caller: CallerFrame,
}

/// Byte-level knowledge of one architecture's compiled-code conventions.
///
/// Every method is a pure function of the cursor and the method's recorded
/// layout facts; none touches live register state except through the
/// [`StackAccess`] seam.
pub trait ArchBackend {
    /// Classifies the frame state at the cursor's instruction pointer.
    /// Total: every reachable address maps to exactly one state.
    fn classify(&self, access: &dyn StackAccess, cursor: &Cursor) -> FrameState;

    /// The local-variables base for the given frame state.
    fn local_variables_base(
        &self,
        access: &dyn StackAccess,
        state: FrameState,
        cursor: &Cursor,
    ) -> Address;

    /// Recovers the caller's (ip, sp, fp) for the given frame state.
    fn caller_frame(
        &self,
        access: &dyn StackAccess,
        state: FrameState,
        cursor: &Cursor,
        purpose: Purpose,
    ) -> CallerFrame;

    /// Resolves the adapter frame at the cursor, which must sit inside the
    /// method's adapter code range.
    fn adapter_frame(&self, access: &dyn StackAccess, cursor: &Cursor) -> AdapterFrameInfo;

    /// The operand-stack pointer for reference-map preparation, with any
    /// stack bias removed.
    fn operand_stack_pointer(&self, cursor: &Cursor) -> Address;

    /// Register-save area bytes to add to the logical frame when preparing
    /// reference maps.
    fn extra_save_area_size(&self) -> usize;

    /// Plans the unwind to `catch_address` in the frame under `cursor`.
    /// Pure computation; nothing is patched here.
    fn plan_unwind(
        &self,
        access: &dyn StackAccess,
        cursor: &Cursor,
        local_base: Address,
        context: &StackUnwindingContext,
        catch_address: Address,
    ) -> UnwindOperation;
}
