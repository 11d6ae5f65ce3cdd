//! Machine addresses and words.
//!
//! The stack walker manipulates raw machine state: instruction pointers,
//! stack pointers, frame pointers, and the words stored at them. `Address`
//! and `Word` are thin newtypes over `u64` so that "a location" and "a value
//! read from a location" cannot be confused. Arithmetic is wrapping, like
//! the hardware's.

use std::fmt;

/// Size in bytes of a machine word on every architecture Sable targets.
pub const WORD_SIZE: usize = 8;

// =============================================================================
// Address
// =============================================================================

/// A raw machine address (instruction pointer, stack slot, frame base).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address {
    /// The zero address. Used as the "no caller" sentinel at the stack root.
    pub const ZERO: Address = Address(0);

    /// Creates an address from a raw value.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Address(raw)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true if this is the zero address.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Address `count` bytes above this one.
    #[inline]
    pub const fn plus(self, count: usize) -> Self {
        Address(self.0.wrapping_add(count as u64))
    }

    /// Address `count` bytes below this one.
    #[inline]
    pub const fn minus(self, count: usize) -> Self {
        Address(self.0.wrapping_sub(count as u64))
    }

    /// Address one word above this one.
    #[inline]
    pub const fn plus_word(self) -> Self {
        self.plus(WORD_SIZE)
    }

    /// Address one word below this one.
    #[inline]
    pub const fn minus_word(self) -> Self {
        self.minus(WORD_SIZE)
    }

    /// Address `n` words above this one.
    #[inline]
    pub const fn plus_words(self, n: usize) -> Self {
        self.plus(n * WORD_SIZE)
    }

    /// Signed byte distance from `other` to `self`.
    #[inline]
    pub const fn offset_from(self, other: Address) -> i64 {
        self.0.wrapping_sub(other.0) as i64
    }

    /// Converts this address to the word holding its raw value.
    #[inline]
    pub const fn to_word(self) -> Word {
        Word(self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// =============================================================================
// Word
// =============================================================================

/// A machine word read from or written to memory or a register.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Word(u64);

impl Word {
    /// The all-zero word.
    pub const ZERO: Word = Word(0);

    /// Creates a word from a raw value.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Word(raw)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true if every bit is zero.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Reinterprets this word as an address.
    #[inline]
    pub const fn as_address(self) -> Address {
        Address(self.0)
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word({:#x})", self.0)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// =============================================================================
// Stack bias
// =============================================================================

/// Fixed offset an ABI applies to the raw stack-pointer register value.
///
/// On SPARC V9 the stack pointer register holds the real stack address minus
/// 2047; every memory access through it must add the bias back. Architectures
/// without a bias use `StackBias::None` and both operations are the identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackBias {
    /// No bias; the register value is the real address.
    None,

    /// SPARC V9 bias of 2047 bytes.
    SparcV9,
}

impl StackBias {
    /// Bias amount in bytes.
    #[inline]
    pub const fn amount(self) -> usize {
        match self {
            StackBias::None => 0,
            StackBias::SparcV9 => 2047,
        }
    }

    /// Converts a real address to the biased register value.
    #[inline]
    pub const fn bias(self, real: Address) -> Address {
        real.minus(self.amount())
    }

    /// Converts a biased register value to the real address it denotes.
    #[inline]
    pub const fn unbias(self, biased: Address) -> Address {
        biased.plus(self.amount())
    }
}

// =============================================================================
// Tests
// =============================================================================
