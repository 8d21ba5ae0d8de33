//! # Vermilion Graphics
//!
//! Backend-agnostic resource and context lifecycle layer for a rendering
//! engine.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsDriver`] - Facade tying every subsystem together
//! - [`NativeContextManager`] - Surface/context handshake with pixel-format
//!   fallback and multi-thread context handoff
//! - [`ResourceTable`] / [`HardwareBufferCache`] - Texture registry and lazy
//!   hardware buffer uploads keyed by change serials
//! - [`RenderTargetPool`] - Target validation and a shared depth/stencil pool
//! - [`VisibilityQueryTracker`] - Per-node occlusion queries with stale
//!   reclamation
//! - [`SoftwareBackend`] - In-memory backend for tests and headless tools
//!
//! ## Example
//!
//! ```
//! use vermilion_graphics::{ContextCreationParams, GraphicsDriver};
//! use vermilion_graphics::types::{ClearFlags, ClearValues};
//!
//! let mut driver =
//!     GraphicsDriver::with_software_backend(ContextCreationParams::default()).unwrap();
//! driver.begin_frame(ClearFlags::all(), &ClearValues::default());
//! // Draw meshes, run visibility queries...
//! driver.end_frame();
//! ```

pub mod backend;
pub mod context;
pub mod driver;
pub mod error;
pub mod image;
pub mod occlusion;
pub mod resources;
pub mod target;
pub mod types;

// Re-export main types for convenience
pub use backend::{CommandSubmitter, NativePlatform, ResourceFactory, SoftwareBackend};
pub use context::{ContextCreationParams, ExposedContextData, NativeContextManager};
pub use driver::GraphicsDriver;
pub use error::DriverError;
pub use image::{Image, ImageLoader, LoaderRegistry};
pub use occlusion::{SceneNode, SceneNodeId, VisibilityQueryTracker};
pub use resources::{HardwareBufferCache, MeshBuffer, ResourceTable, Texture};
pub use target::{RenderTarget, RenderTargetPool};
pub use types::{ClearFlags, ClearValues, ColorFormat, Extent2d, FrameStats, MappingHint};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("Vermilion Graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_software_backend() {
        let backend = SoftwareBackend::new();
        assert!(backend.name() == "software");
    }
}
