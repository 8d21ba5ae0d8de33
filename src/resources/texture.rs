//! GPU texture wrapper.
//!
//! A `Texture` owns its backend allocation and releases it on drop, provided
//! the factory that created it is still alive. Shared ownership goes through
//! `Arc<Texture>`; the driver-level table holds one reference and every user
//! of the texture holds another.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use crate::backend::{ResourceFactory, TextureHandle};
use crate::error::DriverError;
use crate::types::{ColorFormat, Extent2d};

/// How a texture entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TextureSource {
    /// Created directly from in-memory parameters.
    Created = 0,
    /// Loaded from an image file.
    FromFile = 1,
    /// Served again from the table after a name hit.
    Cached = 2,
}

impl TextureSource {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::FromFile,
            2 => Self::Cached,
            _ => Self::Created,
        }
    }
}

/// A named GPU texture, optionally usable as a render target.
pub struct Texture {
    name: String,
    size: Extent2d,
    original_size: Extent2d,
    format: ColorFormat,
    render_target: bool,
    source: AtomicU8,
    handle: TextureHandle,
    factory: Weak<dyn ResourceFactory>,
}

impl Texture {
    /// Allocate a backend texture. The stored size is the size actually
    /// allocated, which may differ from the request when the backend rounds
    /// dimensions; the request is kept as `original_size`.
    pub fn new(
        factory: &Arc<dyn ResourceFactory>,
        name: impl Into<String>,
        size: Extent2d,
        format: ColorFormat,
        render_target: bool,
        source: TextureSource,
    ) -> Result<Texture, DriverError> {
        let name = name.into();
        let allocated = factory.adjust_texture_size(size);
        let handle = factory.create_texture(&name, allocated, format, render_target)?;
        Ok(Texture {
            name,
            size: allocated,
            original_size: size,
            format,
            render_target,
            source: AtomicU8::new(source as u8),
            handle,
            factory: Arc::downgrade(factory),
        })
    }

    /// The unique name under which the texture is registered.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the backend allocation.
    pub fn size(&self) -> Extent2d {
        self.size
    }

    /// Size that was originally requested.
    pub fn original_size(&self) -> Extent2d {
        self.original_size
    }

    /// Storage format.
    pub fn format(&self) -> ColorFormat {
        self.format
    }

    /// Whether the texture was created render-target capable.
    pub fn is_render_target(&self) -> bool {
        self.render_target
    }

    /// How the texture entered the system.
    pub fn source(&self) -> TextureSource {
        TextureSource::from_raw(self.source.load(Ordering::Relaxed))
    }

    /// Record that the texture has been handed out from the table at least
    /// once after its initial creation.
    pub fn mark_cached(&self) {
        self.source
            .store(TextureSource::Cached as u8, Ordering::Relaxed);
    }

    /// Backend handle, for submission.
    pub fn handle(&self) -> TextureHandle {
        self.handle
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(factory) = self.factory.upgrade() {
            factory.destroy_texture(self.handle);
        } else {
            log::trace!(
                "texture '{}' outlived its factory, handle leaked",
                self.name
            );
        }
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("format", &self.format)
            .field("render_target", &self.render_target)
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);
