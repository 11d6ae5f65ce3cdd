//! The compiled-method descriptor consumed by the walker.
//!
//! `TargetMethod` is the walker's only view of a compiled method. It exposes
//! the layout facts the code generators recorded at compile time (frame
//! size, entry points, adapter geometry) and the two queries the walker
//! delegates outright: catch-address lookup and reference-map preparation.
//! Everything behind this trait belongs to the compilers and is opaque here.

use crate::refmap::ReferenceMapSink;
use crate::unwind::ExceptionTypeId;
use sable_core::Address;

/// A compiled method, template-JIT tier or optimizing tier.
///
/// Methods compiled by the template JIT carry two entry points: the JIT
/// entry used by same-tier callers and the optimized entry used by
/// optimizing-tier callers. When the two differ, the code between the
/// optimized entry and the JIT prologue is the adapter stub that translates
/// between the calling conventions.
pub trait TargetMethod {
    /// First address of this method's machine code.
    fn code_start(&self) -> Address;

    /// Size in bytes of this method's machine code.
    fn code_size(&self) -> usize;

    /// Size in bytes of this method's fully built frame.
    fn frame_size(&self) -> usize;

    /// Entry point used by template-JIT callers.
    fn jit_entry_point(&self) -> Address;

    /// Entry point used by optimizing-tier callers.
    fn optimized_entry_point(&self) -> Address;

    /// Size in bytes of the adapter stub's code, measured from the
    /// optimized entry point. Zero when the method has no adapter.
    fn adapter_frame_code_size(&self) -> usize;

    /// Size in bytes of the adapter's own frame (data, not code).
    fn adapter_frame_size(&self) -> usize;

    /// Size in bytes of the frame-builder instruction sequence that follows
    /// the adapter (register-window architectures; zero elsewhere).
    fn frame_builder_size(&self) -> usize;

    /// Bytes of locals that are not incoming parameters.
    fn size_of_non_parameter_locals(&self) -> usize;

    /// Bytes of template spill slots below the frame base
    /// (register-window architectures; zero elsewhere).
    fn size_of_template_slots(&self) -> usize;

    /// True for the designated trap-handling stub. A trap recorded inside
    /// it is a fatal invariant violation.
    fn is_trap_stub(&self) -> bool {
        false
    }

    /// Address of the handler covering `throw_ip` for the given exception
    /// runtime type, or `None` if this frame does not catch it. `None` is
    /// the expected majority answer, not an error.
    fn catch_address_for(
        &self,
        is_top_frame: bool,
        throw_ip: Address,
        exception_type: ExceptionTypeId,
    ) -> Option<Address>;

    /// Reports this frame's live reference slots to `sink`, given the frame
    /// boundaries the walker computed. Returns false if the recorded map
    /// does not cover `ip`, which the caller treats as fatal.
    fn prepare_frame_reference_map(
        &self,
        sink: &mut dyn ReferenceMapSink,
        ip: Address,
        frame_base: Address,
        operand_sp: Address,
        extra_save_area_size: usize,
    ) -> bool;

    /// True when this method carries an adapter stub, i.e. its two entry
    /// points differ.
    fn has_adapter_frame(&self) -> bool {
        self.jit_entry_point() != self.optimized_entry_point()
    }

    /// One-past-the-end address of this method's code.
    fn code_end(&self) -> Address {
        self.code_start().plus(self.code_size())
    }

    /// True when `ip` falls within this method's code.
    fn contains(&self, ip: Address) -> bool {
        ip >= self.code_start() && ip < self.code_end()
    }

    /// True when `ip` falls within this method's adapter stub code.
    fn is_in_adapter_code(&self, ip: Address) -> bool {
        if !self.has_adapter_frame() {
            return false;
        }
        let start = self.optimized_entry_point();
        ip >= start && ip < start.plus(self.adapter_frame_code_size())
    }
}
