//! Frame inspection for debuggers and profilers.
//!
//! The two inspection purposes hand each walked frame to a consumer-supplied
//! visitor and let its boolean result control continuation. No VM state is
//! mutated on these paths, which is why they are the only ones usable while
//! the target thread is merely suspended rather than actively unwinding.

use crate::target_method::TargetMethod;
use bitflags::bitflags;
use sable_core::Address;

bitflags! {
    /// Flags describing a visited frame.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FrameFlags: u8 {
        /// The innermost frame of the walk.
        const TOP_FRAME = 1 << 0;
        /// An adapter stub frame between calling conventions.
        const ADAPTER_FRAME = 1 << 1;
    }
}

impl FrameFlags {
    /// Builds the flag set from the walker's two booleans.
    #[inline]
    pub fn make(is_top_frame: bool, is_adapter_frame: bool) -> Self {
        let mut flags = FrameFlags::empty();
        if is_top_frame {
            flags |= FrameFlags::TOP_FRAME;
        }
        if is_adapter_frame {
            flags |= FrameFlags::ADAPTER_FRAME;
        }
        flags
    }
}

/// A structured frame descriptor handed to [`FrameVisitor`].
pub struct StackFrame<'a> {
    /// The compiled method owning the frame's instruction pointer.
    pub method: &'a dyn TargetMethod,

    /// Instruction pointer within the frame.
    pub ip: Address,

    /// Stack pointer of the frame.
    pub sp: Address,

    /// Local-variables base (frame-pointer equivalent).
    pub frame_base: Address,

    /// Top-frame / adapter-frame flags.
    pub flags: FrameFlags,
}

impl StackFrame<'_> {
    /// True for the innermost frame of the walk.
    #[inline]
    pub fn is_top_frame(&self) -> bool {
        self.flags.contains(FrameFlags::TOP_FRAME)
    }

    /// True for an adapter stub frame.
    #[inline]
    pub fn is_adapter_frame(&self) -> bool {
        self.flags.contains(FrameFlags::ADAPTER_FRAME)
    }
}

/// Visitor receiving raw frame tuples. Returning false stops the walk.
pub trait RawFrameVisitor {
    /// Called once per frame, innermost first.
    fn visit_raw_frame(
        &mut self,
        method: &dyn TargetMethod,
        ip: Address,
        sp: Address,
        frame_base: Address,
        flags: FrameFlags,
    ) -> bool;
}

/// Visitor receiving structured frame descriptors. Returning false stops
/// the walk.
pub trait FrameVisitor {
    /// Called once per frame, innermost first.
    fn visit_frame(&mut self, frame: &StackFrame<'_>) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_flags_make() {
        assert_eq!(FrameFlags::make(false, false), FrameFlags::empty());
        assert_eq!(
            FrameFlags::make(true, false),
            FrameFlags::TOP_FRAME
        );
        assert_eq!(
            FrameFlags::make(true, true),
            FrameFlags::TOP_FRAME | FrameFlags::ADAPTER_FRAME
        );
        assert_eq!(
            FrameFlags::make(false, true),
            FrameFlags::ADAPTER_FRAME
        );
    }
}
