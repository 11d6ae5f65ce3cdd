//! Error types and result definitions for Sable.
//!
//! Stack walking distinguishes three tiers of failure:
//!
//! - **Fatal invariant violations** (a caller instruction pointer owned by no
//!   compiled method, a reference-map preparation failure, a trap recorded
//!   inside the trap stub): these indicate a layout or code-generation defect
//!   and abort the process via [`fatal_error`].
//! - **Expected skip conditions** (a stack-fault trap during reference-map
//!   preparation): not errors at all; the frame is silently skipped.
//! - **Normal negative results** ("no catch address at this frame"): the
//!   expected majority case, expressed as `Option`, never as an error.
//!
//! The error enum below covers only the first tier. It is surfaced as a
//! `Result` so the core stays testable; the top-level walk loop converts it
//! into an abort.

use crate::addr::Address;
use thiserror::Error;

/// The unified result type used throughout Sable.
pub type SableResult<T> = Result<T, SableError>;

/// Fatal conditions detected while walking a stack.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SableError {
    /// A compiled method's reference map could not be prepared. The frame
    /// layout recorded by the compiler disagrees with the walker's; there is
    /// no safe way to continue a garbage collection past this frame.
    #[error(
        "reference map preparation failed in method at {code_start} (ip {ip}, frame base {frame_base})"
    )]
    ReferenceMapFailed {
        /// Code start of the offending method.
        code_start: Address,
        /// Instruction pointer within the method.
        ip: Address,
        /// Local-variables base handed to the preparer.
        frame_base: Address,
    },

    /// A caller instruction pointer that is neither the root sentinel nor
    /// covered by any compiled method.
    #[error("caller instruction pointer {ip} is not within any compiled method")]
    MissingCallerMethod {
        /// The unresolvable instruction pointer.
        ip: Address,
    },

    /// A hardware trap was recorded for a frame of the designated
    /// trap-handling stub, where traps must not occur.
    #[error("trap recorded inside the trap stub (ip {ip})")]
    TrapInTrapStub {
        /// Instruction pointer at which the trap was observed.
        ip: Address,
    },
}

/// Aborts the process with diagnostic context for a tier-one failure.
///
/// Continuing past any [`SableError`] would mean interpreting machine state
/// the code generator and the walker disagree about.
pub fn fatal_error(context: &str, err: &SableError) -> ! {
    tracing::error!(context, error = %err, "fatal stack-walk invariant violation");
    eprintln!("sable: fatal: {context}: {err}");
    std::process::abort()
}
