//! Render targets and the shared depth/stencil pool.
//!
//! Binding a plain color texture as a target goes through a pooled
//! depth/stencil attachment: one D24S8 texture per size, created on first
//! use, registered in the texture table and reused for every later bind of
//! the same size. Multi-attachment targets are validated and passed through
//! unchanged.

use std::sync::Arc;

use crate::backend::{CommandSubmitter, ResourceFactory, TextureHandle};
use crate::error::DriverError;
use crate::resources::{ResourceTable, Texture, TextureSource};
use crate::types::{ClearFlags, ClearValues, ColorFormat, Extent2d};

/// Name under which pooled depth/stencil textures are registered.
pub const SHARED_DEPTH_NAME: &str = "__vermilion_depth_stencil";

/// A validated set of target attachments.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    size: Extent2d,
    colors: Vec<Arc<Texture>>,
    depth_stencil: Option<Arc<Texture>>,
}

impl RenderTarget {
    /// Assemble a target. All color attachments must be render-target
    /// capable and share one size; the depth attachment must match it.
    pub fn new(
        colors: Vec<Arc<Texture>>,
        depth_stencil: Option<Arc<Texture>>,
    ) -> Result<Self, DriverError> {
        let first = colors.first().ok_or_else(|| {
            DriverError::InvalidRenderTarget("target needs at least one color attachment".into())
        })?;
        let size = first.size();
        for color in &colors {
            if !color.is_render_target() {
                return Err(DriverError::InvalidRenderTarget(format!(
                    "texture '{}' was not created as a render target",
                    color.name()
                )));
            }
            if color.size() != size {
                return Err(DriverError::InvalidRenderTarget(format!(
                    "color attachment '{}' is {} but the target is {}",
                    color.name(),
                    color.size(),
                    size
                )));
            }
        }
        if let Some(depth) = &depth_stencil {
            if !depth.format().is_depth() {
                return Err(DriverError::InvalidRenderTarget(format!(
                    "'{}' is not a depth format attachment",
                    depth.name()
                )));
            }
            if depth.size() != size {
                return Err(DriverError::InvalidRenderTarget(format!(
                    "depth attachment is {} but the target is {}",
                    depth.size(),
                    size
                )));
            }
        }
        Ok(Self {
            size,
            colors,
            depth_stencil,
        })
    }

    /// Common size of all attachments.
    pub fn size(&self) -> Extent2d {
        self.size
    }

    /// Color attachments in bind order.
    pub fn colors(&self) -> &[Arc<Texture>] {
        &self.colors
    }

    /// Depth/stencil attachment, if any.
    pub fn depth_stencil(&self) -> Option<&Arc<Texture>> {
        self.depth_stencil.as_ref()
    }
}

/// Tracks the active target and pools shared depth attachments by size.
pub struct RenderTargetPool {
    factory: Arc<dyn ResourceFactory>,
    submitter: Arc<dyn CommandSubmitter>,
    active: Option<RenderTarget>,
    shared_depth: Vec<Arc<Texture>>,
    screen_size: Extent2d,
}

impl RenderTargetPool {
    /// Create an empty pool for a screen of the given size.
    pub fn new(
        factory: Arc<dyn ResourceFactory>,
        submitter: Arc<dyn CommandSubmitter>,
        screen_size: Extent2d,
    ) -> Self {
        Self {
            factory,
            submitter,
            active: None,
            shared_depth: Vec::new(),
            screen_size,
        }
    }

    /// Bind a single color texture, attaching a pooled depth/stencil texture
    /// of matching size. The pooled texture is registered in `table` on
    /// first creation.
    pub fn bind_simple(
        &mut self,
        table: &mut ResourceTable,
        color: &Arc<Texture>,
        clear: ClearFlags,
        values: &ClearValues,
    ) -> Result<(), DriverError> {
        let depth = self.shared_depth_for(table, color.size())?;
        let target = RenderTarget::new(vec![color.clone()], Some(depth))?;
        self.bind_raw(Some(target), clear, values)
    }

    /// Bind a prepared target, or the primary surface when `target` is
    /// `None`. The clear is issued in either case.
    pub fn bind_raw(
        &mut self,
        target: Option<RenderTarget>,
        clear: ClearFlags,
        values: &ClearValues,
    ) -> Result<(), DriverError> {
        match target {
            Some(target) => {
                if !self.factory.supports_offscreen_targets()
                    && !target.size().fits_within(self.screen_size)
                {
                    return Err(DriverError::InvalidRenderTarget(format!(
                        "target {} exceeds the {} screen and off-screen targets are unsupported",
                        target.size(),
                        self.screen_size
                    )));
                }
                if !target.size().fits_within(self.factory.max_target_size()) {
                    return Err(DriverError::InvalidRenderTarget(format!(
                        "target {} exceeds the backend limit {}",
                        target.size(),
                        self.factory.max_target_size()
                    )));
                }
                let colors: Vec<TextureHandle> =
                    target.colors().iter().map(|c| c.handle()).collect();
                let depth = target.depth_stencil().map(|d| d.handle());
                self.submitter.bind_target(&colors, depth);
                self.active = Some(target);
            }
            None => {
                self.submitter.bind_primary();
                self.active = None;
            }
        }
        self.submitter.clear(clear, values);
        Ok(())
    }

    fn shared_depth_for(
        &mut self,
        table: &mut ResourceTable,
        size: Extent2d,
    ) -> Result<Arc<Texture>, DriverError> {
        if let Some(existing) = self
            .shared_depth
            .iter()
            .find(|depth| depth.size() == size)
        {
            return Ok(existing.clone());
        }
        log::debug!("creating shared depth/stencil attachment for {size}");
        let factory = self.factory.clone();
        let depth = Arc::new(Texture::new(
            &factory,
            SHARED_DEPTH_NAME,
            size,
            ColorFormat::D24S8,
            true,
            TextureSource::Created,
        )?);
        table.insert(depth.clone());
        self.shared_depth.push(depth.clone());
        Ok(depth)
    }

    /// Pooled depth texture of the given size, if one exists.
    pub fn shared_depth(&self, size: Extent2d) -> Option<&Arc<Texture>> {
        self.shared_depth.iter().find(|depth| depth.size() == size)
    }

    /// The currently bound target, `None` when rendering to the primary
    /// surface.
    pub fn active(&self) -> Option<&RenderTarget> {
        self.active.as_ref()
    }

    /// Drop the active target and every pooled depth attachment.
    pub fn remove_all(&mut self) {
        self.active = None;
        self.shared_depth.clear();
    }

    /// Track a resized screen. Existing pooled attachments keep their size;
    /// only the limit for backends without off-screen support changes.
    pub fn on_resize(&mut self, screen_size: Extent2d) {
        self.screen_size = screen_size;
    }

    /// Current screen size.
    pub fn screen_size(&self) -> Extent2d {
        self.screen_size
    }
}

impl std::fmt::Debug for RenderTargetPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTargetPool")
            .field("active", &self.active.is_some())
            .field("pooled_depths", &self.shared_depth.len())
            .field("screen_size", &self.screen_size)
            .finish()
    }
}

static_assertions::assert_impl_all!(RenderTargetPool: Send, Sync);
