//! Core primitives shared across the Sable runtime.
//!
//! This crate carries the pieces every other Sable crate needs and none of
//! them should define twice:
//!
//! - [`addr`]: machine addresses, words, and stack-bias handling
//! - [`error`]: the unified error type and the fatal-error abort helper

#![deny(unsafe_op_in_unsafe_fn)]

pub mod addr;
pub mod error;

pub use addr::{Address, StackBias, Word, WORD_SIZE};
pub use error::{fatal_error, SableError, SableResult};
