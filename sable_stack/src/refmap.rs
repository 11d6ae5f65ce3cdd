//! Reference-map preparation for garbage collection.
//!
//! The walker does not interpret reference maps itself; it computes the
//! frame boundaries and delegates to the compiled method's own map data.
//! One case is skipped outright: the frame interrupted by a stack-overflow
//! guard-page fault. The stack-banging instruction that raises it is always
//! in a prologue that precedes establishment of any live reference, so no
//! roots exist to report there. The trap travels on the cursor and dies
//! when the walk advances, so every frame beyond the faulted one reports
//! its roots normally.

use crate::cursor::Cursor;
use sable_core::{Address, SableError, SableResult};

/// Consumer of live reference-slot reports, owned by the collector.
pub trait ReferenceMapSink {
    /// Records that the frame slot at `slot` holds a live object reference.
    fn record_reference_slot(&mut self, slot: Address);
}

/// Prepares the reference map for the frame under `cursor`.
///
/// `frame_base` is the frame-state-derived local-variables base,
/// `operand_sp` the operand-stack pointer with any stack bias removed, and
/// `extra_save_area_size` the architecture's register-save area not
/// otherwise part of the logical frame.
pub(crate) fn prepare_frame(
    cursor: &Cursor,
    sink: &mut dyn ReferenceMapSink,
    frame_base: Address,
    operand_sp: Address,
    extra_save_area_size: usize,
) -> SableResult<()> {
    if let Some(trap) = cursor.trap() {
        if cursor.method().is_trap_stub() {
            return Err(SableError::TrapInTrapStub { ip: cursor.ip() });
        }
        if trap.kind.is_stack_fault() {
            tracing::trace!(ip = %cursor.ip(), "skipping stack-fault frame, no live roots");
            return Ok(());
        }
    }

    let method = cursor.method();
    if !method.prepare_frame_reference_map(
        sink,
        cursor.ip(),
        frame_base,
        operand_sp,
        extra_save_area_size,
    ) {
        return Err(SableError::ReferenceMapFailed {
            code_start: method.code_start(),
            ip: cursor.ip(),
            frame_base,
        });
    }
    Ok(())
}
