//! Stack walking and exception unwinding for tiered compiled code.
//!
//! A thread's stack interleaves frames from the template JIT, the
//! optimizing compiler, and the adapter stubs that bridge their calling
//! conventions. This crate walks such stacks frame by frame for four
//! purposes — exception dispatch, GC root scanning, and two flavors of
//! inspection — without assuming the walked thread is at a call site:
//! the instruction pointer may sit mid-prologue or mid-epilogue, and the
//! classifier resolves which parts of the frame exist yet.
//!
//! ```text
//!   StackWalker ──▶ ArchBackend::classify ──▶ FrameState
//!        │                                        │
//!        │          purpose action                │
//!        ├──▶ unwind   (ExceptionHandling)        │
//!        ├──▶ refmap   (ReferenceMapPreparing)    ▼
//!        ├──▶ inspect  (Raw/Inspecting)     caller (ip, sp, fp)
//!        └──▶ advance ◀───────────────────────────┘
//! ```
//!
//! Architecture knowledge lives entirely behind [`arch::ArchBackend`]; the
//! driver, the purpose dispatch, and the unwind planning are generic. All
//! machine-state reads go through [`StackAccess`], so the whole protocol
//! runs over synthetic stack images in tests.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod access;
mod adapter;
pub mod arch;
pub mod config;
mod cursor;
pub mod frame_state;
pub mod inspect;
pub mod purpose;
pub mod refmap;
pub mod target_method;
pub mod trap;
pub mod unwind;
pub mod walker;

#[cfg(test)]
pub(crate) mod testutil;

pub use access::{MemoryStackAccess, RegisterRole, StackAccess};
pub use config::WalkConfig;
pub use cursor::Cursor;
pub use frame_state::FrameState;
pub use inspect::{FrameFlags, FrameVisitor, RawFrameVisitor, StackFrame};
pub use purpose::{Purpose, WalkContext};
pub use refmap::ReferenceMapSink;
pub use target_method::TargetMethod;
pub use trap::{TrapKind, TrapState};
pub use unwind::{
    ExceptionTypeId, StackUnwindingContext, ThrownException, UnwindEnvironment, UnwindOperation,
    UnwindPatch, UnwindTransfer,
};
pub use walker::StackWalker;
