//! Walk purposes and their per-purpose contexts.

use crate::inspect::{FrameVisitor, RawFrameVisitor};
use crate::refmap::ReferenceMapSink;
use crate::unwind::{StackUnwindingContext, UnwindEnvironment, UnwindTransfer};

/// Why a stack is being walked. Fixed for the duration of a walk and
/// determines which side-effect handler runs at each frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Purpose {
    /// Searching for an exception handler; terminal side effect on a hit.
    ExceptionHandling,

    /// Reporting GC roots; failure is fatal.
    ReferenceMapPreparing,

    /// Handing raw frame tuples to a visitor; visitor controls continuation.
    RawInspecting,

    /// Handing structured frame descriptors to a visitor; visitor controls
    /// continuation. The only purpose usable on a merely suspended thread.
    Inspecting,
}

/// The purpose-specific consumer for one walk, borrowed for its duration.
pub enum WalkContext<'a> {
    /// Exception dispatch: the pending exception plus the VM services and
    /// the architecture transfer primitive the unwind will need.
    ExceptionHandling {
        /// Pending exception and unwind bookkeeping.
        context: &'a mut StackUnwindingContext,
        /// VM services consumed by the terminal unwind.
        env: &'a mut dyn UnwindEnvironment,
        /// The irreversible control-transfer primitive.
        transfer: &'a dyn UnwindTransfer,
    },

    /// GC root scanning into the given sink.
    ReferenceMapPreparing(&'a mut dyn ReferenceMapSink),

    /// Raw frame-tuple inspection.
    RawInspecting(&'a mut dyn RawFrameVisitor),

    /// Structured frame inspection.
    Inspecting(&'a mut dyn FrameVisitor),
}

impl WalkContext<'_> {
    /// The purpose tag this context serves.
    #[inline]
    pub fn purpose(&self) -> Purpose {
        match self {
            WalkContext::ExceptionHandling { .. } => Purpose::ExceptionHandling,
            WalkContext::ReferenceMapPreparing(_) => Purpose::ReferenceMapPreparing,
            WalkContext::RawInspecting(_) => Purpose::RawInspecting,
            WalkContext::Inspecting(_) => Purpose::Inspecting,
        }
    }
}
