//! Shared value types.

mod buffer;
mod common;

pub use buffer::{BufferKind, BufferUsage, MappingHint};
pub use common::{ClearFlags, ClearValues, ColorFormat, Extent2d, FrameStats};
