//! Context creation parameters.

use crate::types::Extent2d;

/// Parameters consumed by [`NativeContextManager::initialize`].
///
/// All fields may be downgraded in place by the pixel-format fallback policy
/// in [`NativeContextManager::generate_surface`]: after a successful fallback
/// the stored parameters reflect what was actually obtained, not what was
/// requested.
///
/// [`NativeContextManager::initialize`]: crate::context::NativeContextManager::initialize
/// [`NativeContextManager::generate_surface`]: crate::context::NativeContextManager::generate_surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextCreationParams {
    /// Size of the window client area.
    pub window_size: Extent2d,
    /// Whether to run fullscreen.
    pub fullscreen: bool,
    /// Requested color depth in bits.
    pub color_bits: u8,
    /// Requested depth-buffer bits.
    pub depth_bits: u8,
    /// Whether a stencil buffer is requested.
    pub stencil: bool,
    /// Whether double buffering is requested.
    pub double_buffer: bool,
    /// Whether a stereo framebuffer is requested.
    pub stereo: bool,
    /// Requested anti-alias sample count; 0 disables multisampling.
    pub samples: u8,
    /// Externally-owned native window handle; 0 means "create our own".
    pub external_window: u64,
}

impl Default for ContextCreationParams {
    fn default() -> Self {
        Self {
            window_size: Extent2d::new(800, 600),
            fullscreen: false,
            color_bits: 32,
            depth_bits: 24,
            stencil: true,
            double_buffer: true,
            stereo: false,
            samples: 0,
            external_window: 0,
        }
    }
}

impl ContextCreationParams {
    /// Set the window size.
    pub fn with_window_size(mut self, size: Extent2d) -> Self {
        self.window_size = size;
        self
    }

    /// Set the anti-alias sample count.
    pub fn with_samples(mut self, samples: u8) -> Self {
        self.samples = samples;
        self
    }

    /// Set the stencil buffer request.
    pub fn with_stencil(mut self, stencil: bool) -> Self {
        self.stencil = stencil;
        self
    }

    /// Set the double-buffer request.
    pub fn with_double_buffer(mut self, double_buffer: bool) -> Self {
        self.double_buffer = double_buffer;
        self
    }

    /// Set an externally-owned native window handle.
    pub fn with_external_window(mut self, handle: u64) -> Self {
        self.external_window = handle;
        self
    }
}
