//! The walker's window onto machine state.
//!
//! All reads of stack memory, code bytes, and registers go through
//! [`StackAccess`]. The walking thread is either the thread that owns the
//! stack or a controller walking a thread parked at a safepoint, so the
//! state behind this trait is stable for the duration of a walk; the trait
//! itself carries no synchronization.
//!
//! [`MemoryStackAccess`] is the out-of-process implementation: a captured
//! image of a suspended thread's stack, code, and registers, as used by the
//! external inspector and by the test suite's synthetic stacks.

use crate::target_method::TargetMethod;
use crate::trap::TrapState;
use rustc_hash::FxHashMap;
use sable_core::{Address, Word, WORD_SIZE};
use std::sync::Arc;

/// ABI register roles the walker may need to read.
///
/// Roles are resolved to concrete registers by the port's startup
/// configuration; the walker only ever names the role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegisterRole {
    /// The register holding the call address when a callee has not yet
    /// saved its return address to the stack.
    FramelessCallAddress,
}

/// Read (and, for unwinding, write) access to one thread's machine state.
pub trait StackAccess {
    /// Reads the word at `addr`.
    fn read_word(&self, addr: Address) -> Word;

    /// Writes the word at `addr`. Used only by the unwind patch path.
    fn write_word(&mut self, addr: Address, value: Word);

    /// Reads one code byte at `addr`.
    fn read_byte(&self, addr: Address) -> u8;

    /// Reads one 32-bit instruction word at `addr`.
    fn read_instruction(&self, addr: Address) -> u32;

    /// Reads the register holding the given role.
    fn read_register(&self, role: RegisterRole) -> Word;

    /// Trap state recorded when the walked thread was interrupted, if any.
    /// The walker attaches it to the innermost frame of the walk; it never
    /// applies to outer frames.
    fn trap_state(&self) -> Option<TrapState>;

    /// The compiled method owning `ip`, if any.
    fn method_at(&self, ip: Address) -> Option<Arc<dyn TargetMethod>>;
}

// =============================================================================
// MemoryStackAccess
// =============================================================================

/// Machine state captured as a byte image, for inspection of a suspended
/// thread from outside and for synthetic stacks in tests.
#[derive(Default)]
pub struct MemoryStackAccess {
    memory: FxHashMap<u64, u8>,
    registers: FxHashMap<RegisterRole, Word>,
    methods: Vec<Arc<dyn TargetMethod>>,
    trap: Option<TrapState>,
}

impl MemoryStackAccess {
    /// Creates an empty image. Unwritten memory reads as zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a compiled method for `method_at` lookup.
    pub fn register_method(&mut self, method: Arc<dyn TargetMethod>) {
        self.methods.push(method);
    }

    /// Sets a register value.
    pub fn set_register(&mut self, role: RegisterRole, value: Word) {
        self.registers.insert(role, value);
    }

    /// Records trap state for the innermost frame of the next walk.
    pub fn set_trap_state(&mut self, trap: Option<TrapState>) {
        self.trap = trap;
    }

    /// Writes one byte into the image.
    pub fn set_byte(&mut self, addr: Address, value: u8) {
        self.memory.insert(addr.as_u64(), value);
    }

    /// Writes a 32-bit instruction word into the image.
    pub fn set_instruction(&mut self, addr: Address, value: u32) {
        for (i, b) in value.to_le_bytes().iter().enumerate() {
            self.set_byte(addr.plus(i), *b);
        }
    }

    /// Writes a full word into the image.
    pub fn set_word(&mut self, addr: Address, value: Word) {
        for (i, b) in value.as_u64().to_le_bytes().iter().enumerate() {
            self.set_byte(addr.plus(i), *b);
        }
    }
}

impl StackAccess for MemoryStackAccess {
    fn read_word(&self, addr: Address) -> Word {
        let mut bytes = [0u8; WORD_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read_byte(addr.plus(i));
        }
        Word::new(u64::from_le_bytes(bytes))
    }

    fn write_word(&mut self, addr: Address, value: Word) {
        self.set_word(addr, value);
    }

    fn read_byte(&self, addr: Address) -> u8 {
        self.memory.get(&addr.as_u64()).copied().unwrap_or(0)
    }

    fn read_instruction(&self, addr: Address) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read_byte(addr.plus(i));
        }
        u32::from_le_bytes(bytes)
    }

    fn read_register(&self, role: RegisterRole) -> Word {
        self.registers.get(&role).copied().unwrap_or(Word::ZERO)
    }

    fn trap_state(&self) -> Option<TrapState> {
        self.trap
    }

    fn method_at(&self, ip: Address) -> Option<Arc<dyn TargetMethod>> {
        self.methods.iter().find(|m| m.contains(ip)).cloned()
    }
}
