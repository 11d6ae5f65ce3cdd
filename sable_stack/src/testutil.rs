//! Synthetic compiled methods for driving the walker over hand-built
//! stack images.

use crate::refmap::ReferenceMapSink;
use crate::target_method::TargetMethod;
use crate::unwind::ExceptionTypeId;
use sable_core::Address;
use std::cell::Cell;

/// A [`TargetMethod`] whose layout facts are set directly by the test.
///
/// Defaults: both entry points at the code start (no adapter), 16 bytes of
/// non-parameter locals, 32 bytes of template slots, no handlers, and a
/// reference map that reports the frame base as its single live slot.
pub(crate) struct SyntheticMethod {
    code_start: Address,
    code_size: usize,
    frame_size: usize,
    jit_entry: Address,
    optimized_entry: Address,
    adapter_frame_code_size: usize,
    adapter_frame_size: usize,
    frame_builder_size: usize,
    non_parameter_locals: usize,
    template_slots: usize,
    trap_stub: bool,
    handlers: Vec<(ExceptionTypeId, Address)>,
    catch_queries: Cell<usize>,
    refmap_result: bool,
}

impl SyntheticMethod {
    pub(crate) fn new(code_start: Address, code_size: usize, frame_size: usize) -> Self {
        Self {
            code_start,
            code_size,
            frame_size,
            jit_entry: code_start,
            optimized_entry: code_start,
            adapter_frame_code_size: 0,
            adapter_frame_size: 0,
            frame_builder_size: 0,
            non_parameter_locals: 16,
            template_slots: 32,
            trap_stub: false,
            handlers: Vec::new(),
            catch_queries: Cell::new(0),
            refmap_result: true,
        }
    }

    /// Gives the method an adapter stub: a distinct optimized entry point
    /// followed by `adapter_frame_code_size` bytes of adapter code.
    pub(crate) fn with_adapter(
        mut self,
        optimized_entry: Address,
        adapter_frame_code_size: usize,
        adapter_frame_size: usize,
    ) -> Self {
        self.optimized_entry = optimized_entry;
        self.adapter_frame_code_size = adapter_frame_code_size;
        self.adapter_frame_size = adapter_frame_size;
        self
    }

    /// Moves the optimized entry point without adding adapter code.
    pub(crate) fn with_optimized_entry(mut self, optimized_entry: Address) -> Self {
        self.optimized_entry = optimized_entry;
        self
    }

    pub(crate) fn with_frame_builder(mut self, size: usize) -> Self {
        self.frame_builder_size = size;
        self
    }

    /// Registers a handler covering the whole method for one exception type.
    pub(crate) fn with_handler(mut self, ty: ExceptionTypeId, catch_address: Address) -> Self {
        self.handlers.push((ty, catch_address));
        self
    }

    pub(crate) fn with_trap_stub(mut self) -> Self {
        self.trap_stub = true;
        self
    }

    /// Makes reference-map preparation report an uncovered instruction
    /// pointer.
    pub(crate) fn with_failing_reference_map(mut self) -> Self {
        self.refmap_result = false;
        self
    }

    /// How many times `catch_address_for` has been asked on this method.
    pub(crate) fn catch_queries(&self) -> usize {
        self.catch_queries.get()
    }
}

impl TargetMethod for SyntheticMethod {
    fn code_start(&self) -> Address {
        self.code_start
    }

    fn code_size(&self) -> usize {
        self.code_size
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn jit_entry_point(&self) -> Address {
        self.jit_entry
    }

    fn optimized_entry_point(&self) -> Address {
        self.optimized_entry
    }

    fn adapter_frame_code_size(&self) -> usize {
        self.adapter_frame_code_size
    }

    fn adapter_frame_size(&self) -> usize {
        self.adapter_frame_size
    }

    fn frame_builder_size(&self) -> usize {
        self.frame_builder_size
    }

    fn size_of_non_parameter_locals(&self) -> usize {
        self.non_parameter_locals
    }

    fn size_of_template_slots(&self) -> usize {
        self.template_slots
    }

    fn is_trap_stub(&self) -> bool {
        self.trap_stub
    }

    fn catch_address_for(
        &self,
        _is_top_frame: bool,
        _throw_ip: Address,
        exception_type: ExceptionTypeId,
    ) -> Option<Address> {
        self.catch_queries.set(self.catch_queries.get() + 1);
        self.handlers
            .iter()
            .find(|(ty, _)| *ty == exception_type)
            .map(|(_, catch)| *catch)
    }

    fn prepare_frame_reference_map(
        &self,
        sink: &mut dyn ReferenceMapSink,
        _ip: Address,
        frame_base: Address,
        _operand_sp: Address,
        _extra_save_area_size: usize,
    ) -> bool {
        if self.refmap_result {
            sink.record_reference_slot(frame_base);
        }
        self.refmap_result
    }
}
