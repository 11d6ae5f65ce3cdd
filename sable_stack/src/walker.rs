//! The frame-walk driver.
//!
//! One walker owns one cursor and drives it outward from the innermost
//! frame toward the stack base, one frame per step:
//!
//! ```text
//!   begin(ip, sp, fp)
//!        │
//!        ▼
//!   ┌─ walk_frame ◀────────────────────────┐
//!   │    adapter code?  ──▶ adapter walk   │
//!   │    else: classify ──▶ purpose action │
//!   │    recover caller (ip, sp, fp)       │
//!   │    caller ip == 0? ──▶ done          │
//!   │    resolve caller method, advance ───┘
//!   └──▶ stop: root reached, visitor said
//!         stop, or a handler was entered
//! ```
//!
//! The driver itself never touches instruction bytes or frame layouts;
//! everything architecture-specific sits behind [`ArchBackend`]. What the
//! driver does own is the protocol: adapter frames are detected before any
//! classification, the purpose action runs before the caller is resolved,
//! and a caller instruction pointer of zero is the only normal way a walk
//! ends.

use crate::access::StackAccess;
use crate::adapter;
use crate::arch::{ArchBackend, CallerFrame};
use crate::cursor::Cursor;
use crate::inspect::{FrameFlags, StackFrame};
use crate::purpose::WalkContext;
use crate::refmap;
use crate::unwind;
use sable_core::{fatal_error, Address, SableError, SableResult};

/// Drives one stack walk at a time over a fixed architecture backend.
///
/// The walker may be reused for any number of walks, but holds at most one
/// in-progress walk; [`begin`](Self::begin) discards any previous session.
pub struct StackWalker<'a> {
    backend: &'a dyn ArchBackend,
    cursor: Option<Cursor>,
}

impl<'a> StackWalker<'a> {
    /// Creates a walker over the given architecture backend.
    pub fn new(backend: &'a dyn ArchBackend) -> Self {
        Self {
            backend,
            cursor: None,
        }
    }

    /// Starts a walk at the given machine state, which must denote a frame
    /// of a known compiled method. Any recorded trap state attaches to this
    /// innermost frame and goes no further.
    pub fn begin(
        &mut self,
        access: &dyn StackAccess,
        ip: Address,
        sp: Address,
        fp: Address,
    ) -> SableResult<()> {
        let method = access
            .method_at(ip)
            .ok_or(SableError::MissingCallerMethod { ip })?;
        self.cursor = Some(Cursor::top(ip, sp, fp, method).with_trap(access.trap_state()));
        Ok(())
    }

    /// Abandons the in-progress walk, if any.
    pub fn reset(&mut self) {
        self.cursor = None;
    }

    /// True while a walk is in progress.
    #[inline]
    pub fn is_in_progress(&self) -> bool {
        self.cursor.is_some()
    }

    /// Walks every remaining frame, treating any error as fatal.
    ///
    /// This is the entry point for the contexts that cannot recover from a
    /// failed walk: exception dispatch and GC root scanning. Inspection
    /// callers wanting error recovery drive [`walk_frame`](Self::walk_frame)
    /// themselves.
    pub fn walk(&mut self, access: &mut dyn StackAccess, ctx: &mut WalkContext<'_>) {
        loop {
            match self.walk_frame(access, ctx) {
                Ok(true) => {}
                Ok(false) => return,
                Err(err) => fatal_error("stack walk", &err),
            }
        }
    }

    /// Processes the frame under the cursor and advances to its caller.
    ///
    /// Returns `Ok(false)` when the walk is over: the root sentinel was
    /// reached, an inspection visitor asked to stop, or an exception walk
    /// found its handler and transferred.
    pub fn walk_frame(
        &mut self,
        access: &mut dyn StackAccess,
        ctx: &mut WalkContext<'_>,
    ) -> SableResult<bool> {
        let cursor = match &self.cursor {
            Some(cursor) => cursor.clone(),
            None => return Ok(false),
        };

        tracing::trace!(
            ip = %cursor.ip(),
            sp = %cursor.sp(),
            fp = %cursor.fp(),
            top = cursor.is_top_frame(),
            "walking frame"
        );

        if cursor.method().is_in_adapter_code(cursor.ip()) {
            return match adapter::walk_adapter_frame(self.backend, &*access, &cursor, ctx) {
                Some(caller) => self.advance(&*access, caller),
                None => {
                    self.reset();
                    Ok(false)
                }
            };
        }

        let purpose = ctx.purpose();
        let state = self.backend.classify(&*access, &cursor);
        let local_base = self.backend.local_variables_base(&*access, state, &cursor);

        match ctx {
            WalkContext::ExceptionHandling {
                context,
                env,
                transfer,
            } => {
                if let Some(op) =
                    unwind::plan(self.backend, &*access, &cursor, local_base, &**context)
                {
                    // The session must be dead before the irreversible part
                    // runs; nothing may observe a half-advanced cursor.
                    self.reset();
                    unwind::execute(access, *env, *transfer, &op);
                    return Ok(false);
                }
            }
            WalkContext::ReferenceMapPreparing(sink) => {
                refmap::prepare_frame(
                    &cursor,
                    *sink,
                    local_base,
                    self.backend.operand_stack_pointer(&cursor),
                    self.backend.extra_save_area_size(),
                )?;
            }
            WalkContext::RawInspecting(visitor) => {
                let flags = FrameFlags::make(cursor.is_top_frame(), false);
                if !visitor.visit_raw_frame(
                    cursor.method().as_ref(),
                    cursor.ip(),
                    cursor.sp(),
                    local_base,
                    flags,
                ) {
                    self.reset();
                    return Ok(false);
                }
            }
            WalkContext::Inspecting(visitor) => {
                let frame = StackFrame {
                    method: cursor.method().as_ref(),
                    ip: cursor.ip(),
                    sp: cursor.sp(),
                    frame_base: local_base,
                    flags: FrameFlags::make(cursor.is_top_frame(), false),
                };
                if !visitor.visit_frame(&frame) {
                    self.reset();
                    return Ok(false);
                }
            }
        }

        let caller = self.backend.caller_frame(&*access, state, &cursor, purpose);
        self.advance(&*access, caller)
    }

    /// Moves the cursor to the recovered caller frame, ending the walk at
    /// the root sentinel.
    fn advance(&mut self, access: &dyn StackAccess, caller: CallerFrame) -> SableResult<bool> {
        if caller.ip.is_zero() {
            self.cursor = None;
            return Ok(false);
        }

        let method = access
            .method_at(caller.ip)
            .ok_or(SableError::MissingCallerMethod { ip: caller.ip })?;

        if let Some(cursor) = &mut self.cursor {
            cursor.advance(caller.ip, caller.sp, caller.fp, method);
        }
        Ok(true)
    }
}
