//! One-time walk-subsystem configuration.
//!
//! The walk layer keeps no mutable process-wide globals. Everything a port
//! fixes at startup — ABI register roles in the register-window save area,
//! the transfer helper's frame size — is captured here once and passed to
//! the components that need it, so the core can be driven with synthetic
//! layouts in tests.

/// Configuration fixed at subsystem startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WalkConfig {
    /// Frame size in bytes of the unwind transfer helper. The destination
    /// stack pointer handed to the helper is lowered by this amount so that
    /// the helper's own epilogue lands the machine exactly on the handler's
    /// expected stack top. Zero for a frameless (inline-assembly) helper.
    pub unwind_frame_size: usize,

    /// Saved-register-window slot index of the template-JIT frame-pointer
    /// register (register-window architectures).
    pub frame_pointer_window_index: usize,

    /// Saved-register-window slot index of the literal-base register
    /// (register-window architectures).
    pub literal_base_window_index: usize,
}

impl WalkConfig {
    /// Configuration for the AMD64 port: frameless transfer helper, no
    /// register windows.
    pub const fn amd64() -> Self {
        Self {
            unwind_frame_size: 0,
            frame_pointer_window_index: 0,
            literal_base_window_index: 0,
        }
    }

    /// Configuration for the SPARC port, given the window-slot indices the
    /// ABI assigns to the JIT frame pointer and literal base registers.
    pub const fn sparc(frame_pointer_window_index: usize, literal_base_window_index: usize) -> Self {
        Self {
            unwind_frame_size: 0,
            frame_pointer_window_index,
            literal_base_window_index,
        }
    }

    /// Overrides the transfer helper frame size.
    pub const fn with_unwind_frame_size(mut self, size: usize) -> Self {
        self.unwind_frame_size = size;
        self
    }
}
