//! SPARC V9 backend.
//!
//! SPARC compiled code differs from the byte-pattern architectures in three
//! ways the walker must model:
//!
//! - **Register windows.** A frame does not necessarily own a window; the
//!   window keeps moving with the stack pointer, and its sixteen saved
//!   registers (l0–l7, i0–i7) live in the 128-byte area at the real stack
//!   pointer address. Unwinding patches those saved slots and lets the
//!   hardware's own return sequence land in the handler.
//! - **Stack bias.** The stack- and frame-pointer registers hold the real
//!   address minus 2047; every memory access adds the bias back.
//! - **Range classification.** There are no distinctive opcode bytes to
//!   read; frame state follows from comparing the instruction pointer
//!   against the frame builder's start and end addresses. One wrinkle: when
//!   the frame size does not fit a `simm13` immediate the builder needs two
//!   instructions before the stack pointer moves, so its first two
//!   instruction addresses still count as in the caller's frame.

use crate::access::{RegisterRole, StackAccess};
use crate::arch::{AdapterFrameInfo, ArchBackend, CallerFrame};
use crate::config::WalkConfig;
use crate::cursor::Cursor;
use crate::frame_state::FrameState;
use crate::purpose::Purpose;
use crate::unwind::{StackUnwindingContext, UnwindOperation, UnwindPatch, UnwindTransfer};
use sable_core::{Address, StackBias, Word, WORD_SIZE};
use smallvec::SmallVec;

/// Fixed SPARC instruction width in bytes.
pub const INSTRUCTION_WIDTH: usize = 4;

/// One stack slot.
const STACK_SLOT_SIZE: usize = WORD_SIZE;

/// Bytes every frame must reserve above the stack pointer: the sixteen-slot
/// register-window save area plus the six mandatory output-register slots.
pub const MIN_STACK_FRAME_SIZE: usize = 16 * WORD_SIZE + 6 * WORD_SIZE;

/// Bytes of the caller save area above the template slots (saved frame
/// pointer and return address).
const CALL_SAVE_AREA_SIZE: usize = 2 * STACK_SLOT_SIZE;

/// Size of the l0–l7 half of the window save area, reported to the
/// reference-map preparer as extra save area.
pub const LOCAL_REGISTERS_SAVE_AREA_SIZE: usize = 8 * WORD_SIZE;

/// Offset from the biased stack pointer to the first template slot above
/// the reserved window and output area.
const OFFSET_FROM_SP_TO_FIRST_SLOT: usize =
    StackBias::SparcV9.amount() + MIN_STACK_FRAME_SIZE;

/// The template return instruction, `jmpl %i7+8, %g0` with the restore in
/// its delay slot following.
pub const RET_TEMPLATE: u32 = 0x81C7_E008;

/// A SPARC call writes the call address; the return lands one instruction
/// pair later.
pub const RETURN_PC_OFFSET: usize = 8;

/// Window-save-area slot index of %i6 (the saved frame pointer).
const WINDOW_SLOT_I6: usize = 14;

/// Window-save-area slot index of %i7 (the saved call address).
const WINDOW_SLOT_I7: usize = 15;

/// Offset from a trapped frame's stack pointer to the trap-state record
/// spilled above its reserved area.
const TRAP_STATE_OFFSET_FROM_TRAPPED_SP: usize = OFFSET_FROM_SP_TO_FIRST_SLOT;

/// Offset of the saved call-address register within the trap-state record.
const TRAP_STATE_CALL_ADDRESS_OFFSET: usize = 0;

/// Offset from an adapter's frame pointer to its floating-point temp area;
/// the adapter's return-address save slot is the word below it.
const OFFSET_TO_FLOATING_POINT_TEMP_AREA: usize = 24 * WORD_SIZE;

/// True when `value` fits a 13-bit signed immediate.
#[inline]
pub fn is_simm13(value: i64) -> bool {
    (-4096..=4095).contains(&value)
}

/// Real address of a saved-window slot, given the biased stack pointer the
/// window was saved relative to.
#[inline]
fn window_slot(biased_sp: Address, index: usize) -> Address {
    StackBias::SparcV9.unbias(biased_sp).plus_words(index)
}

/// Saved-window slot addressed from an already-unbiased frame pointer.
#[inline]
fn window_slot_unbiased(real_fp: Address, index: usize) -> Address {
    real_fp.plus_words(index)
}

/// The SPARC walk backend.
#[derive(Clone, Copy, Debug)]
pub struct SparcBackend {
    config: WalkConfig,
}

impl SparcBackend {
    /// Creates the backend from the port's startup configuration, which
    /// assigns the window-slot indices of the JIT frame pointer and literal
    /// base registers.
    pub fn new(config: WalkConfig) -> Self {
        Self { config }
    }

    /// Offset from the frame pointer to the top of the frame: the template
    /// slots plus the call save area, padded to the frame alignment.
    fn offset_to_top_of_frame(cursor: &Cursor) -> usize {
        let unaligned = cursor.method().size_of_template_slots() + CALL_SAVE_AREA_SIZE;
        (unaligned + 15) & !15
    }

    /// The return-address slot, valid only in the `Normal` state.
    fn return_address_slot(cursor: &Cursor) -> Address {
        // The slot is the top word of the call save area.
        cursor
            .fp()
            .plus(Self::offset_to_top_of_frame(cursor) - STACK_SLOT_SIZE)
    }
}

impl ArchBackend for SparcBackend {
    fn classify(&self, access: &dyn StackAccess, cursor: &Cursor) -> FrameState {
        let method = cursor.method();
        let optimized_entry = method.optimized_entry_point();
        if cursor.ip() < optimized_entry {
            return FrameState::InCallerFrame;
        }

        let builder_start = optimized_entry.plus(method.adapter_frame_code_size());
        let builder_end = builder_start.plus(method.frame_builder_size());

        if cursor.ip() >= builder_end {
            let current = access.read_instruction(cursor.ip());
            let previous = access.read_instruction(cursor.ip().minus(INSTRUCTION_WIDTH));
            if current == RET_TEMPLATE || previous == RET_TEMPLATE {
                return FrameState::ExitingCallee;
            }
            return FrameState::Normal;
        }

        // Inside the frame builder. A frame too large for simm13 moves the
        // stack pointer only with the builder's third instruction, so the
        // first two addresses are still in the caller's frame.
        if !is_simm13(method.frame_size() as i64)
            && (cursor.ip() == builder_start
                || cursor.ip() == builder_start.plus(INSTRUCTION_WIDTH))
        {
            return FrameState::InCallerFrame;
        }
        FrameState::BuildingCalleeFrame
    }

    fn local_variables_base(
        &self,
        _access: &dyn StackAccess,
        state: FrameState,
        cursor: &Cursor,
    ) -> Address {
        match state {
            FrameState::Normal => cursor.fp(),
            FrameState::InCallerFrame => cursor.sp().minus(Self::offset_to_top_of_frame(cursor)),
            FrameState::BuildingCalleeFrame => cursor
                .sp()
                .plus(cursor.method().size_of_non_parameter_locals() + OFFSET_FROM_SP_TO_FIRST_SLOT),
            // Assumes an empty operand stack, which holds on exit; this
            // state is only reachable for inspection.
            FrameState::ExitingCallee => cursor
                .sp()
                .plus(cursor.method().size_of_non_parameter_locals()),
        }
    }

    fn caller_frame(
        &self,
        access: &dyn StackAccess,
        state: FrameState,
        cursor: &Cursor,
        purpose: Purpose,
    ) -> CallerFrame {
        let caller_ip = if state == FrameState::Normal {
            access
                .read_word(Self::return_address_slot(cursor))
                .as_address()
        } else if let Some(trap) = cursor.trap() {
            // The return address never reached its slot; the trap recorded
            // the caller's call address for us.
            trap.caller_ip
        } else if cursor.is_top_frame()
            && state == FrameState::BuildingCalleeFrame
            && matches!(
                purpose,
                Purpose::ExceptionHandling | Purpose::ReferenceMapPreparing
            )
        {
            // Outside inspection this position is only reachable after a
            // trap in the prologue (stack banging); fish the call address
            // out of the trap state spilled above the trapped stack pointer.
            let trap_state = cursor.sp().plus(TRAP_STATE_OFFSET_FROM_TRAPPED_SP);
            access
                .read_word(trap_state.plus(TRAP_STATE_CALL_ADDRESS_OFFSET))
                .as_address()
        } else {
            access
                .read_register(RegisterRole::FramelessCallAddress)
                .as_address()
        };

        let caller_sp = match state {
            FrameState::InCallerFrame => cursor.sp(),
            _ => cursor.sp().plus(cursor.method().frame_size()),
        };

        let caller_fp = match state {
            FrameState::Normal => access
                .read_word(Self::return_address_slot(cursor).minus_word())
                .as_address(),
            _ => cursor.fp(),
        };

        CallerFrame {
            ip: caller_ip,
            sp: caller_sp,
            fp: caller_fp,
        }
    }

    fn adapter_frame(&self, access: &dyn StackAccess, cursor: &Cursor) -> AdapterFrameInfo {
        let method = cursor.method();
        let optimized_entry = method.optimized_entry_point();
        let is_top = cursor.is_top_frame();

        let adapter_top_frame_size = method.adapter_frame_size();
        // A non-top adapter frame has given its reserved bottom region to
        // the callee's register window.
        let adapter_frame_size = if is_top {
            adapter_top_frame_size
        } else {
            adapter_top_frame_size - MIN_STACK_FRAME_SIZE
        };

        // The adapter's `save` is its third instruction; before it executes
        // the frame pointer is still the caller's stack pointer.
        let in_caller_register_window =
            cursor.ip() < optimized_entry.plus(2 * INSTRUCTION_WIDTH);

        let (frame_pointer, stack_pointer) = if in_caller_register_window {
            (cursor.sp(), cursor.sp().minus(adapter_frame_size))
        } else {
            let fp = if is_top {
                cursor.fp()
            } else {
                // Read off the callee's frame, so unbiased; rebias it.
                StackBias::SparcV9.bias(cursor.fp())
            };
            (fp, cursor.sp())
        };

        let caller = if is_top {
            if in_caller_register_window {
                CallerFrame {
                    ip: access
                        .read_register(RegisterRole::FramelessCallAddress)
                        .as_address(),
                    sp: cursor.sp(),
                    fp: cursor.fp(),
                }
            } else {
                // The bottom of the frame holds the window save area.
                CallerFrame {
                    ip: access
                        .read_word(window_slot(cursor.sp(), WINDOW_SLOT_I7))
                        .as_address()
                        .plus(RETURN_PC_OFFSET),
                    sp: frame_pointer,
                    fp: access
                        .read_word(window_slot(cursor.sp(), WINDOW_SLOT_I6))
                        .as_address(),
                }
            }
        } else {
            // The caller's return address was spilled to the adapter's
            // save slot, one word below the floating-point temp area.
            let return_address_save =
                frame_pointer.plus(OFFSET_TO_FLOATING_POINT_TEMP_AREA - WORD_SIZE);
            CallerFrame {
                ip: access.read_word(return_address_save).as_address(),
                sp: frame_pointer,
                fp: access
                    .read_word(window_slot_unbiased(cursor.fp(), WINDOW_SLOT_I6))
                    .as_address(),
            }
        };

        AdapterFrameInfo {
            frame_pointer,
            stack_pointer,
            frame_size: adapter_frame_size,
            caller,
        }
    }

    fn operand_stack_pointer(&self, cursor: &Cursor) -> Address {
        StackBias::SparcV9.unbias(cursor.sp())
    }

    fn extra_save_area_size(&self) -> usize {
        LOCAL_REGISTERS_SAVE_AREA_SIZE
    }

    fn plan_unwind(
        &self,
        access: &dyn StackAccess,
        cursor: &Cursor,
        local_base: Address,
        context: &StackUnwindingContext,
        catch_address: Address,
    ) -> UnwindOperation {
        let method = cursor.method();

        // First operand-stack slot: frame base minus non-parameter locals,
        // the saved literal base, and the slot itself.
        let catcher_top_of_stack = local_base
            .minus(method.size_of_non_parameter_locals() + 2 * STACK_SLOT_SIZE);
        let literal_base = access.read_word(local_base.minus(STACK_SLOT_SIZE));

        // The handler becomes the top frame: reserve a full window-and-
        // outputs region below its stack top, then bias the result.
        let catcher_sp =
            StackBias::SparcV9.bias(catcher_top_of_stack.minus(MIN_STACK_FRAME_SIZE));

        // Window contents are only addressable relative to the stack
        // pointer recorded when unwinding began.
        let window_sp = context.window_sp.unwrap_or_else(|| cursor.sp());
        let caller_fp = access.read_word(window_slot(window_sp, WINDOW_SLOT_I6));
        let caller_pc = access.read_word(window_slot(window_sp, WINDOW_SLOT_I7));

        let mut patches = SmallVec::new();
        patches.push(UnwindPatch {
            at: catcher_top_of_stack,
            value: Word::ZERO,
        });
        patches.push(UnwindPatch {
            at: window_slot(catcher_sp, self.config.frame_pointer_window_index),
            value: local_base.to_word(),
        });
        patches.push(UnwindPatch {
            at: window_slot(catcher_sp, self.config.literal_base_window_index),
            value: literal_base,
        });
        patches.push(UnwindPatch {
            at: window_slot(catcher_sp, WINDOW_SLOT_I6),
            value: caller_fp,
        });
        patches.push(UnwindPatch {
            at: window_slot(catcher_sp, WINDOW_SLOT_I7),
            value: caller_pc,
        });

        UnwindOperation {
            catch_address,
            handler_sp: catcher_sp,
            handler_fp: local_base,
            patches,
            exception: context.exception.object,
            stack_overflow: context.exception.stack_overflow,
            flush_register_windows: true,
        }
    }
}

// =============================================================================
// Transfer primitive
// =============================================================================

/// The SPARC unwind transfer.
///
/// ABI contract before the hardware return sequence: register windows
/// flushed to memory, the patched save area authoritative, %i7 holding the
/// handler address adjusted for the link-register convention, and %i6
/// holding the handler's biased stack pointer.
#[derive(Clone, Copy, Debug, Default)]
pub struct SparcTransfer;

impl UnwindTransfer for SparcTransfer {
    unsafe fn transfer(&self, op: &UnwindOperation) {
        #[cfg(target_arch = "sparc64")]
        unsafe {
            // Provided by the port's assembly stub: flushes the register
            // windows, installs %i7 and %i6, and returns through the
            // restored window.
            extern "C" {
                fn sable_sparc_unwind_transfer(link: u64, biased_sp: u64) -> !;
            }
            sable_sparc_unwind_transfer(
                op.catch_address.minus(RETURN_PC_OFFSET).as_u64(),
                op.handler_sp.as_u64(),
            );
        }
        #[cfg(not(target_arch = "sparc64"))]
        {
            let _ = op;
            std::process::abort();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
