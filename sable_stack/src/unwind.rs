//! Exception unwinding.
//!
//! During an `ExceptionHandling` walk each frame is asked for a catch
//! address covering the throw point. No answer is the expected majority
//! case and the walk simply continues outward. An answer is terminal: the
//! walk session is reset, the handler's stack state is computed and
//! patched, and control transfers directly to the handler, bypassing the
//! normal call/return path.
//!
//! ```text
//!   walk frame ──▶ catch_address_for(ip, type)?
//!        │                    │
//!        │ none               │ some
//!        ▼                    ▼
//!   advance to caller    plan UnwindOperation (checked arithmetic)
//!   (exception            reset walk session
//!    propagates)          apply stack patches, re-enable safepoints
//!                         UnwindTransfer::transfer  ── does not return
//! ```
//!
//! Everything up to the final transfer is ordinary checked logic producing
//! an explicit [`UnwindOperation`]; only the register/stack install behind
//! [`UnwindTransfer`] is irreducibly unsafe.

use crate::access::StackAccess;
use crate::arch::ArchBackend;
use crate::cursor::Cursor;
use sable_core::{Address, Word};
use smallvec::SmallVec;

/// Patches planned per unwind. Four window slots plus the cleared
/// operand-stack slot is the register-window worst case.
const PATCH_CAPACITY: usize = 6;

// =============================================================================
// Exception identity
// =============================================================================

/// Runtime type of a thrown exception, opaque to this layer. The compiled
/// method's handler table matches on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExceptionTypeId(pub u32);

/// The pending exception being dispatched.
#[derive(Clone, Copy, Debug)]
pub struct ThrownException {
    /// Opaque reference to the exception object. Communicated to the
    /// handler through the thread-local pending-exception slot, never
    /// through the stack.
    pub object: Word,

    /// Runtime type used for handler matching.
    pub type_id: ExceptionTypeId,

    /// True for a stack-overflow exception, whose dispatch must re-protect
    /// the stack guard zone before entering the handler.
    pub stack_overflow: bool,
}

/// State carried across the frames of one exception-handling walk.
#[derive(Clone, Copy, Debug)]
pub struct StackUnwindingContext {
    /// The exception being dispatched.
    pub exception: ThrownException,

    /// Stack pointer recorded at the moment unwinding began. On
    /// register-window architectures the saved window contents are only
    /// addressable relative to this value.
    pub window_sp: Option<Address>,
}

impl StackUnwindingContext {
    /// Creates the context for one unwinding walk.
    pub fn new(exception: ThrownException, window_sp: Option<Address>) -> Self {
        Self {
            exception,
            window_sp,
        }
    }
}

// =============================================================================
// The planned operation
// =============================================================================

/// One word to write before transferring control.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnwindPatch {
    /// Location to write.
    pub at: Address,

    /// Value to write.
    pub value: Word,
}

/// Everything the terminal control transfer needs, computed with ordinary
/// checked arithmetic before anything irreversible happens.
#[derive(Clone, Debug)]
pub struct UnwindOperation {
    /// Entry address of the handler.
    pub catch_address: Address,

    /// Stack-pointer register value to install at transfer.
    pub handler_sp: Address,

    /// Frame-pointer register value to install at transfer.
    pub handler_fp: Address,

    /// Stack words to write before the transfer: the cleared top-of-stack
    /// slot, the planted return address, patched window-save slots.
    pub patches: SmallVec<[UnwindPatch; PATCH_CAPACITY]>,

    /// The exception object for the thread-local pending-exception slot.
    pub exception: Word,

    /// Whether the stack guard zone must be re-protected first.
    pub stack_overflow: bool,

    /// Whether pending register windows must be flushed to memory before
    /// the patched slots become authoritative.
    pub flush_register_windows: bool,
}

// =============================================================================
// VM services and the transfer primitive
// =============================================================================

/// VM services the terminal unwind consumes.
pub trait UnwindEnvironment {
    /// Stores the exception object in the thread-local slot the handler's
    /// prologue reads it from.
    fn set_pending_exception(&mut self, object: Word);

    /// Re-enables the safepoint mechanism suspended while the exception was
    /// being raised. Called as the final step before the transfer so the
    /// handler resumes in a GC-safe state.
    fn enable_safepoints(&mut self);

    /// Re-protects the stack guard zone after a stack-overflow unwind.
    fn reprotect_stack_guard(&mut self);
}

/// The per-architecture control-transfer primitive.
///
/// Implementations install the operation's stack and frame pointers and
/// resume at the handler; on hardware they never return. The method is not
/// typed `-> !` so that test doubles can record the operation instead.
pub trait UnwindTransfer {
    /// Performs the irreversible transfer.
    ///
    /// # Safety
    ///
    /// The operation's patches must already be applied and its register
    /// values must describe a valid handler frame on the current thread's
    /// stack; the machine state after the call is whatever the operation
    /// says it is.
    unsafe fn transfer(&self, op: &UnwindOperation);
}

// =============================================================================
// Planning and execution
// =============================================================================

/// Asks the current frame for a handler and, on a hit, plans the unwind.
///
/// Returns `None` when this frame does not catch the exception, which lets
/// the walk continue to the caller.
pub(crate) fn plan(
    backend: &dyn ArchBackend,
    access: &dyn StackAccess,
    cursor: &Cursor,
    local_base: Address,
    context: &StackUnwindingContext,
) -> Option<UnwindOperation> {
    let method = cursor.method();
    let catch_address = method.catch_address_for(
        cursor.is_top_frame(),
        cursor.ip(),
        context.exception.type_id,
    )?;

    tracing::debug!(
        throw_pos = cursor.ip().offset_from(method.code_start()),
        handler_pos = catch_address.offset_from(method.code_start()),
        "found exception handler"
    );

    Some(backend.plan_unwind(access, cursor, local_base, context, catch_address))
}

/// Applies a planned unwind and transfers control.
///
/// The caller must already have reset the owning walk session; this
/// operation is fire-and-forget and does not return under normal
/// conditions on hardware backends.
pub(crate) fn execute(
    access: &mut dyn StackAccess,
    env: &mut dyn UnwindEnvironment,
    transfer: &dyn UnwindTransfer,
    op: &UnwindOperation,
) {
    env.set_pending_exception(op.exception);

    if op.stack_overflow {
        // No further stack banging may run before the handler is entered.
        env.reprotect_stack_guard();
    }

    for patch in &op.patches {
        access.write_word(patch.at, patch.value);
    }

    env.enable_safepoints();

    // Safety: the patches above established exactly the stack state the
    // operation's register values describe.
    unsafe { transfer.transfer(op) };
}
