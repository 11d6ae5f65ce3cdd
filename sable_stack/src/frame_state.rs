//! The frame-state machine.
//!
//! For any instruction address inside one compiled method, exactly one of
//! these states describes where the logical frame currently lives relative
//! to the machine registers. Classification is a pure function of the
//! instruction address and the method's recorded landmarks (prologue start
//! and end, adapter presence); it reads already-emitted code bytes, never
//! register state. The per-state address arithmetic lives in the
//! architecture backends, which dispatch on this closed set.

/// Where the logical frame lives at the current instruction position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameState {
    /// Frame fully built; the frame-pointer register holds its base.
    Normal,

    /// Entering the callee: its frame is not yet allocated, the
    /// frame-pointer register still holds the caller's. The callee frame
    /// must be derived from the stack pointer and the known frame size.
    /// Also covers the epilogue instants where the frame is already gone.
    InCallerFrame,

    /// Frame allocated but the frame-pointer register does not yet point at
    /// it; derive the frame base from the stack pointer.
    BuildingCalleeFrame,

    /// Frame being torn down on return.
    ExitingCallee,
}

impl FrameState {
    /// All states, in classification-priority order.
    pub const ALL: [FrameState; 4] = [
        FrameState::Normal,
        FrameState::InCallerFrame,
        FrameState::BuildingCalleeFrame,
        FrameState::ExitingCallee,
    ];
}
