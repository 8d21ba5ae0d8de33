//! Common value types shared across the resource and context layer.

use bitflags::bitflags;

/// A 2D pixel extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent2d {
    /// Create a new extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether this extent fits inside `other` on both axes.
    pub fn fits_within(&self, other: Extent2d) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

impl std::fmt::Display for Extent2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Color and depth/stencil storage formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    /// 16 bit, no alpha.
    R5G6B5,
    /// 16 bit, 1 bit alpha.
    A1R5G5B5,
    /// 24 bit.
    R8G8B8,
    /// 32 bit.
    A8R8G8B8,
    /// 16 bit depth.
    D16,
    /// 24 bit depth with 8 bit stencil.
    D24S8,
    /// 32 bit float depth.
    D32,
}

impl ColorFormat {
    /// Whether this is a depth (or depth/stencil) format.
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::D16 | Self::D24S8 | Self::D32)
    }

    /// Whether this format carries a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::D24S8)
    }
}

bitflags! {
    /// Which attachments a bind/clear operation touches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        /// Clear the color attachments.
        const COLOR = 1 << 0;
        /// Clear the depth attachment.
        const DEPTH = 1 << 1;
        /// Clear the stencil attachment.
        const STENCIL = 1 << 2;
    }
}

impl Default for ClearFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Values used when clearing attachments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    /// RGBA clear color in `[0, 1]`.
    pub color: [f32; 4],
    /// Depth clear value in `[0, 1]`.
    pub depth: f32,
    /// Stencil clear value.
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Per-frame counters, reset at the start of each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Draw calls issued this frame.
    pub draw_calls: u32,
    /// Primitives submitted this frame.
    pub primitives_drawn: u64,
}
