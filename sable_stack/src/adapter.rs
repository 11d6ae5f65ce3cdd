//! Adapter frame handling.
//!
//! An adapter stub bridges the two calling conventions of a method's entry
//! points. Its frame holds no locals, no operand stack, and no handlers, so
//! exception handling and reference-map preparation skip it entirely; the
//! inspection purposes still report it, flagged as an adapter, so that
//! consumers see a gapless frame sequence. Nothing about an adapter frame
//! is persisted between walks; its geometry is recomputed here each time
//! from the method's recorded layout facts.

use crate::access::StackAccess;
use crate::arch::{ArchBackend, CallerFrame};
use crate::cursor::Cursor;
use crate::inspect::{FrameFlags, StackFrame};
use crate::purpose::WalkContext;

/// Walks the adapter frame under `cursor` and recovers its caller.
///
/// Returns `None` when an inspection visitor asked to stop; otherwise the
/// caller state the walk advances to.
pub(crate) fn walk_adapter_frame(
    backend: &dyn ArchBackend,
    access: &dyn StackAccess,
    cursor: &Cursor,
    ctx: &mut WalkContext<'_>,
) -> Option<CallerFrame> {
    let info = backend.adapter_frame(access, cursor);

    tracing::trace!(
        ip = %cursor.ip(),
        frame_size = info.frame_size,
        "walking adapter frame"
    );

    match ctx {
        // Adapters have no handlers and hold no references.
        WalkContext::ExceptionHandling { .. } | WalkContext::ReferenceMapPreparing(_) => {}
        WalkContext::RawInspecting(visitor) => {
            let flags = FrameFlags::make(cursor.is_top_frame(), true);
            if !visitor.visit_raw_frame(
                cursor.method().as_ref(),
                cursor.ip(),
                info.stack_pointer,
                info.frame_pointer,
                flags,
            ) {
                return None;
            }
        }
        WalkContext::Inspecting(visitor) => {
            let frame = StackFrame {
                method: cursor.method().as_ref(),
                ip: cursor.ip(),
                sp: info.stack_pointer,
                frame_base: info.frame_pointer,
                flags: FrameFlags::make(cursor.is_top_frame(), true),
            };
            if !visitor.visit_frame(&frame) {
                return None;
            }
        }
    }

    Some(info.caller)
}
