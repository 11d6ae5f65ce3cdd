//! AMD64 backend.
//!
//! Template-JIT frames on AMD64 are built by a two-instruction prologue
//! whose first instruction is `ENTER` (fixed 4 bytes): it pushes the caller's
//! RBP, points RBP at the pushed slot, and allocates the frame below it.
//! RBP is the local-variables base; the return address sits one word above
//! it and the caller's stack pointer one word above that:
//!
//! ```text
//!   higher addresses
//!   │ ...caller frame...      ◀ caller sp = rbp + 16
//!   │ return address          ◀ rbp + 8
//!   │ saved caller RBP        ◀ rbp (local-variables base)
//!   │ locals / operand stack  (frame_size bytes)
//!   ▼ ...                     ◀ rsp
//! ```
//!
//! Frame state is classified from the opcode byte at the instruction
//! pointer plus the known last-prologue-instruction landmark; this is the
//! byte-pattern architecture of the protocol.

use crate::access::StackAccess;
use crate::arch::{AdapterFrameInfo, ArchBackend, CallerFrame};
use crate::config::WalkConfig;
use crate::cursor::Cursor;
use crate::frame_state::FrameState;
use crate::purpose::Purpose;
use crate::unwind::{StackUnwindingContext, UnwindOperation, UnwindPatch, UnwindTransfer};
use sable_core::{Address, Word, WORD_SIZE};
use smallvec::SmallVec;

/// Opcode of `ENTER`, the frame-build instruction.
const ENTER: u8 = 0xC8;

/// Opcode of `LEAVE`, the frame-teardown instruction.
const LEAVE: u8 = 0xC9;

/// Opcode of `POP RBP`, emitted when returning from a runtime call.
const POP_RBP: u8 = 0x5D;

/// Opcode of `RET`.
const RET: u8 = 0xC3;

/// Opcode of `RET imm16`.
const RET_IMM16: u8 = 0xC2;

/// Offset from the JIT prologue's start to its last instruction. The
/// prologue is two instructions, the first of which is the fixed-size
/// 4-byte `ENTER`.
pub const OFFSET_TO_LAST_PROLOGUE_INSTRUCTION: usize = 4;

/// Size of one template-JIT stack slot.
const JIT_SLOT_SIZE: usize = WORD_SIZE;

/// The AMD64 walk backend.
#[derive(Clone, Copy, Debug)]
pub struct Amd64Backend {
    config: WalkConfig,
}

impl Amd64Backend {
    /// Creates the backend from the port's startup configuration.
    pub fn new(config: WalkConfig) -> Self {
        Self { config }
    }

    /// Address of the first instruction after the adapter (or the JIT entry
    /// when there is no adapter): where the JIT prologue starts.
    fn start_of_prologue(cursor: &Cursor) -> Address {
        let method = cursor.method();
        if method.has_adapter_frame() {
            method
                .optimized_entry_point()
                .plus(method.adapter_frame_code_size())
        } else {
            method.jit_entry_point()
        }
    }

    /// The return-address slot for the given frame state.
    fn return_address_slot(state: FrameState, cursor: &Cursor) -> Address {
        match state {
            FrameState::Normal => cursor.fp().plus_word(),
            // Return address still on top of the stack.
            FrameState::InCallerFrame => cursor.sp(),
            // Frame allocated below the slot; RBP not yet moved.
            FrameState::BuildingCalleeFrame => cursor
                .sp()
                .plus(cursor.method().frame_size())
                .plus_word(),
            // At `POP RBP` the stack pointer sits on the saved-RBP slot.
            FrameState::ExitingCallee => cursor.sp().plus_word(),
        }
    }
}

impl ArchBackend for Amd64Backend {
    fn classify(&self, access: &dyn StackAccess, cursor: &Cursor) -> FrameState {
        let last_prologue_instruction =
            Self::start_of_prologue(cursor).plus(OFFSET_TO_LAST_PROLOGUE_INSTRUCTION);
        let opcode = access.read_byte(cursor.ip());

        if cursor.ip() < last_prologue_instruction
            || opcode == ENTER
            || opcode == RET
            || opcode == RET_IMM16
        {
            FrameState::InCallerFrame
        } else if cursor.ip() == last_prologue_instruction || opcode == LEAVE {
            FrameState::BuildingCalleeFrame
        } else if opcode == POP_RBP {
            FrameState::ExitingCallee
        } else {
            FrameState::Normal
        }
    }

    fn local_variables_base(
        &self,
        _access: &dyn StackAccess,
        state: FrameState,
        cursor: &Cursor,
    ) -> Address {
        match state {
            FrameState::Normal => cursor.fp(),
            // The slot ENTER will push the caller's RBP into.
            FrameState::InCallerFrame => cursor.sp().minus_word(),
            FrameState::BuildingCalleeFrame => cursor.sp().plus(cursor.method().frame_size()),
            FrameState::ExitingCallee => cursor.sp(),
        }
    }

    fn caller_frame(
        &self,
        access: &dyn StackAccess,
        state: FrameState,
        cursor: &Cursor,
        _purpose: Purpose,
    ) -> CallerFrame {
        let return_address_slot = Self::return_address_slot(state, cursor);
        let caller_ip = access.read_word(return_address_slot).as_address();
        let caller_sp = return_address_slot.plus_word();
        let caller_fp = match state {
            FrameState::Normal => access.read_word(cursor.fp()).as_address(),
            FrameState::InCallerFrame => cursor.fp(),
            FrameState::BuildingCalleeFrame => access
                .read_word(cursor.sp().plus(cursor.method().frame_size()))
                .as_address(),
            FrameState::ExitingCallee => access.read_word(cursor.sp()).as_address(),
        };
        CallerFrame {
            ip: caller_ip,
            sp: caller_sp,
            fp: caller_fp,
        }
    }

    fn adapter_frame(&self, access: &dyn StackAccess, cursor: &Cursor) -> AdapterFrameInfo {
        let method = cursor.method();
        let entry_point = method.optimized_entry_point();

        // Before the adapter pushes its slot the stack pointer still points
        // at the caller's return address; afterwards the slot layout sits
        // between the stack pointer and that address.
        let frame_not_yet_built = cursor.ip() == entry_point;
        let return_address_slot = if frame_not_yet_built {
            cursor.sp()
        } else {
            cursor.sp().plus(method.adapter_frame_size())
        };

        let caller_ip = access.read_word(return_address_slot).as_address();
        let caller_sp = return_address_slot.plus_word();

        AdapterFrameInfo {
            frame_pointer: cursor.sp(),
            stack_pointer: cursor.sp(),
            frame_size: method.adapter_frame_size(),
            caller: CallerFrame {
                ip: caller_ip,
                sp: caller_sp,
                fp: caller_sp,
            },
        }
    }

    fn operand_stack_pointer(&self, cursor: &Cursor) -> Address {
        cursor.sp()
    }

    fn extra_save_area_size(&self) -> usize {
        0
    }

    fn plan_unwind(
        &self,
        _access: &dyn StackAccess,
        cursor: &Cursor,
        local_base: Address,
        context: &StackUnwindingContext,
        catch_address: Address,
    ) -> UnwindOperation {
        let method = cursor.method();

        // First operand-stack slot of the catcher: frame base minus locals
        // and the slot itself. The handler's operand stack is always
        // cleared; its prologue reloads the exception from the thread-local
        // slot, so the cleared top slot is the only stack state it sees.
        let catcher_top_of_stack =
            local_base.minus(method.size_of_non_parameter_locals() + JIT_SLOT_SIZE);
        let return_address_slot = catcher_top_of_stack.minus_word();

        let mut patches = SmallVec::new();
        patches.push(UnwindPatch {
            at: catcher_top_of_stack,
            value: Word::ZERO,
        });
        patches.push(UnwindPatch {
            at: return_address_slot,
            value: catch_address.to_word(),
        });

        UnwindOperation {
            catch_address,
            // Lowered by the transfer helper's own frame size; its epilogue
            // brings the stack pointer back onto the planted address.
            handler_sp: return_address_slot.minus(self.config.unwind_frame_size),
            handler_fp: local_base,
            patches,
            exception: context.exception.object,
            stack_overflow: context.exception.stack_overflow,
            flush_register_windows: false,
        }
    }
}

// =============================================================================
// Transfer primitive
// =============================================================================

/// The AMD64 unwind transfer: a frameless primitive, so
/// [`WalkConfig::unwind_frame_size`] must be zero for this port.
///
/// ABI contract before the final `RET`: RSP is one word below the handler's
/// expected stack top and the word at RSP holds the handler's entry address.
#[derive(Clone, Copy, Debug, Default)]
pub struct Amd64Transfer;

impl UnwindTransfer for Amd64Transfer {
    unsafe fn transfer(&self, op: &UnwindOperation) {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            // RET pops the planted handler address; the stack pointer lands
            // on the cleared operand-stack slot.
            core::arch::asm!(
                "mov rsp, {sp}",
                "mov rbp, {fp}",
                "ret",
                sp = in(reg) op.handler_sp.as_u64(),
                fp = in(reg) op.handler_fp.as_u64(),
                options(noreturn),
            );
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            let _ = op;
            std::process::abort();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
